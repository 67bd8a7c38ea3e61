//! Actix Web integration: [`View`] is a `Responder`.

use actix_web::{
  HttpRequest, HttpResponse, Responder,
  body::BoxBody,
  http::{StatusCode, header::ContentType},
  web::Bytes,
};
use futures_util::stream;
use std::convert::Infallible;

use crate::core::app::View;

/// Picks the response type from the template's extension; extensionless and
/// unknown templates are served as HTML.
fn content_type_for(template_name: &str) -> ContentType {
  let extension = template_name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
  match extension.as_deref() {
    Some("txt") => ContentType::plaintext(),
    Some("json") => ContentType::json(),
    Some("xml") => ContentType::xml(),
    _ => ContentType::html(),
  }
}

impl Responder for View {
  type Body = BoxBody;

  fn respond_to(self, _req: &HttpRequest) -> HttpResponse<Self::Body> {
    let content_type = content_type_for(&self.template_name);
    let body = match self.views.render_with_context(&self.template_name, self.context) {
      Ok(body) => body,
      Err(e) => {
        log::error!("Template rendering error in {}: {}", self.template_name, e);
        return actix_web::error::ErrorInternalServerError(e).error_response();
      }
    };

    // Single-item stream that resolves immediately with the rendered body.
    let body_stream = stream::once(async move { Ok::<_, Infallible>(Bytes::from(body)) });

    HttpResponse::build(StatusCode::OK)
      .content_type(content_type)
      .streaming(body_stream)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_content_type_follows_extension() {
    let essence = |name: &str| content_type_for(name).0.essence_str().to_string();
    assert_eq!(essence("index.html"), "text/html");
    assert_eq!(essence("admin/Index"), "text/html");
    assert_eq!(essence("robots.TXT"), "text/plain");
    assert_eq!(essence("api/list.json"), "application/json");
    assert_eq!(essence("feed.xml"), "text/xml");
  }
}
