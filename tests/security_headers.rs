#![cfg(feature = "inmem-store")]

#[macro_use]
mod common;

use actix_web::{test, web, App, HttpResponse};
use common::ctx;
use fixlog::config::AppConfig;
use fixlog::{configure, SecurityHeaders};
use serial_test::serial;

#[actix_web::test]
async fn test_security_headers_present() {
    let ctx = ctx();
    let app = init_app!(ctx.state.clone());
    let req = test::TestRequest::get().uri("/api/posts").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let headers = resp.headers();
    assert!(headers.get("content-security-policy").is_some());
    assert_eq!(headers.get("referrer-policy").unwrap(), "no-referrer");
    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
    assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
    assert!(headers.get("strict-transport-security").is_none()); // not enabled
}

#[actix_web::test]
async fn test_error_responses_carry_headers_too() {
    let ctx = ctx();
    let app = init_app!(ctx.state.clone());
    let req = test::TestRequest::get().uri("/api/posts/9999").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
    assert!(resp.headers().get("content-security-policy").is_some());
}

#[actix_web::test]
#[serial]
async fn test_env_var_enables_hsts() {
    std::env::set_var("JWT_SECRET", common::SECRET);
    std::env::set_var("ENABLE_HSTS", "1");
    let cfg = AppConfig::from_env().unwrap();
    std::env::remove_var("ENABLE_HSTS");

    let ctx = ctx();
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::from_config(&cfg))
            .app_data(web::Data::new(ctx.state.clone()))
            .configure(configure),
    )
    .await;
    let req = test::TestRequest::get().uri("/api/posts").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    assert!(resp.headers().get("strict-transport-security").is_some(), "HSTS header missing");
}

#[actix_web::test]
async fn test_existing_csp_header_preserved() {
    let app = test::init_service(App::new().wrap(SecurityHeaders::new(false)).route(
        "/custom",
        web::get().to(|| async {
            HttpResponse::Ok()
                .insert_header((actix_web::http::header::CONTENT_SECURITY_POLICY, "custom-src 'none'"))
                .finish()
        }),
    ))
    .await;
    let req = test::TestRequest::get().uri("/custom").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let csp = resp.headers().get("content-security-policy").unwrap().to_str().unwrap();
    assert_eq!(csp, "custom-src 'none'");
}
