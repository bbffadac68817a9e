use utoipa::OpenApi;

use crate::routes::health::HealthApi;
use crate::routes::image_flow::ImageFlowApi;
use crate::routes::image_proxy::ImageProxyApi;

#[derive(OpenApi)]
#[openapi(info(
    title = "imageflow-server",
    description = "Marketing image reconstruction and synthesis pipeline",
    version = "0.1.0",
))]
pub struct ApiDoc;

pub fn get_docs() -> utoipa::openapi::OpenApi {
    let mut root = ApiDoc::openapi();
    root.merge(HealthApi::openapi());
    root.merge(ImageFlowApi::openapi());
    root.merge(ImageProxyApi::openapi());
    root
}
