use std::fs;
use std::path::Path;

use actix_web::{web, Responder};
use tera::Context;
use viewcraft::Views;

// Test handler that uses the viewcraft render method
#[allow(dead_code)]
pub async fn test_handler(views: web::Data<Views>) -> impl Responder {
  let mut context = Context::new();
  context.insert("page_title", "Integration Test");
  views.render("index.html", context)
}

/// Writes `content` to `root/name`, creating parent directories.
#[allow(dead_code)]
pub fn write_template(root: &Path, name: &str, content: &str) {
  let path = root.join(name);
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).unwrap();
  }
  fs::write(path, content).unwrap();
}
