mod common;

use crate::common::{test_handler, write_template};

use actix_web::{App, test, web};
use tempfile::tempdir;
use viewcraft::Views;

#[actix_rt::test]
async fn test_render_in_actix_server() {
  let temp_dir = tempdir().unwrap();
  write_template(
    temp_dir.path(),
    "index.html",
    "<html><head><title>{{ site_name }} | {{ page_title }}</title></head></html>",
  );

  let views = Views::builder([temp_dir.path()])
    .add_global("site_name", "Viewcraft App")
    .live_reload(false)
    .build()
    .unwrap();

  let app = test::init_service(
    App::new()
      .app_data(web::Data::new(views))
      .route("/", web::get().to(test_handler)),
  )
  .await;

  let req = test::TestRequest::get().uri("/").to_request();
  let resp = test::call_service(&app, req).await;
  assert!(resp.status().is_success());
  assert_eq!(
    resp.headers().get("content-type").unwrap(),
    "text/html; charset=utf-8"
  );

  let body = test::read_body(resp).await;
  let body_str = std::str::from_utf8(&body).unwrap();
  assert_eq!(body_str, "<html><head><title>Viewcraft App | Integration Test</title></head></html>");
}

#[actix_rt::test]
async fn test_missing_template_is_a_server_error() {
  let temp_dir = tempdir().unwrap();
  let views = Views::builder([temp_dir.path()]).live_reload(false).build().unwrap();

  let app = test::init_service(
    App::new()
      .app_data(web::Data::new(views))
      .route("/", web::get().to(test_handler)),
  )
  .await;

  let req = test::TestRequest::get().uri("/").to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), actix_web::http::StatusCode::INTERNAL_SERVER_ERROR);
}

#[actix_rt::test]
async fn test_broken_sibling_does_not_break_the_page() {
  let temp_dir = tempdir().unwrap();
  write_template(temp_dir.path(), "index.html", "<p>{{ page_title }}</p>");
  write_template(temp_dir.path(), "broken.html", "{% if %}");

  let views = Views::builder([temp_dir.path()]).live_reload(false).build().unwrap();
  assert_eq!(views.compile_error().map(|e| e.name), Some("broken.html".to_string()));

  let app = test::init_service(
    App::new()
      .app_data(web::Data::new(views))
      .route("/", web::get().to(test_handler)),
  )
  .await;

  let req = test::TestRequest::get().uri("/").to_request();
  let body = test::call_and_read_body(&app, req).await;
  assert_eq!(body, "<p>Integration Test</p>");
}
