// HTTP-level tests for the session demo routes
use actix_web::dev::ServiceResponse;
use actix_web::http::{header, StatusCode};
use actix_web::{test, web, App};
use satchel::handlers::configure;
use satchel::testing::{request_cookie, TestFixtures};
use serde_json::{json, Value};

fn set_cookie(response: &ServiceResponse) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string)
}

macro_rules! app {
    () => {
        test::init_service(
            App::new()
                .app_data(web::Data::new(TestFixtures::session_manager()))
                .configure(configure),
        )
        .await
    };
}

#[actix_web::test]
async fn test_ping() {
    let app = app!();
    let response = test::call_service(&app, test::TestRequest::get().uri("/ping").to_request()).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[actix_web::test]
async fn test_reading_empty_session_sets_no_cookie() {
    let app = app!();
    let response =
        test::call_service(&app, test::TestRequest::get().uri("/session").to_request()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookie(&response).is_none());

    let body: Value = test::read_body_json(response).await;
    assert_eq!(body["state"], json!("empty"));
    assert_eq!(body["has_key"], json!(false));
}

#[actix_web::test]
async fn test_store_value_then_read_it_back() {
    let app = app!();
    let response = test::call_service(
        &app,
        test::TestRequest::put()
            .uri("/session/username")
            .set_json(json!("JohnDoe"))
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let issued = set_cookie(&response).unwrap();
    assert!(issued.contains("HttpOnly"));
    assert!(issued.contains("SameSite=Lax"));
    let cookie = request_cookie(&issued);

    let response = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/session")
            .insert_header((header::COOKIE, cookie))
            .to_request(),
    )
    .await;
    assert!(set_cookie(&response).is_none());
    let body: Value = test::read_body_json(response).await;
    assert_eq!(body["data"]["username"], json!("JohnDoe"));
    assert_eq!(body["state"], json!("loaded"));
}

#[actix_web::test]
async fn test_visits_counter_and_flush() {
    let app = app!();

    let first = test::call_service(&app, test::TestRequest::get().uri("/visits").to_request()).await;
    let cookie = request_cookie(&set_cookie(&first).unwrap());
    let body: Value = test::read_body_json(first).await;
    assert_eq!(body["visits"], json!(1));

    let second = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/visits")
            .insert_header((header::COOKIE, cookie.clone()))
            .to_request(),
    )
    .await;
    let body: Value = test::read_body_json(second).await;
    assert_eq!(body["visits"], json!(2));

    let flushed = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/session/flush")
            .insert_header((header::COOKIE, cookie.clone()))
            .to_request(),
    )
    .await;
    let new_cookie = request_cookie(&set_cookie(&flushed).unwrap());
    assert_ne!(new_cookie, cookie);

    // The old cookie no longer reaches any data
    let replay = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/visits")
            .insert_header((header::COOKIE, cookie))
            .to_request(),
    )
    .await;
    let body: Value = test::read_body_json(replay).await;
    assert_eq!(body["visits"], json!(1));
}

#[actix_web::test]
async fn test_cycle_keeps_data_under_new_cookie() {
    let app = app!();
    let response = test::call_service(
        &app,
        test::TestRequest::put()
            .uri("/session/role")
            .set_json(json!("admin"))
            .to_request(),
    )
    .await;
    let old_cookie = request_cookie(&set_cookie(&response).unwrap());

    let cycled = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/session/cycle")
            .insert_header((header::COOKIE, old_cookie.clone()))
            .to_request(),
    )
    .await;
    let new_cookie = request_cookie(&set_cookie(&cycled).unwrap());
    assert_ne!(new_cookie, old_cookie);

    for (cookie, expected) in [(old_cookie, Value::Null), (new_cookie, json!("admin"))] {
        let response = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/session")
                .insert_header((header::COOKIE, cookie))
                .to_request(),
        )
        .await;
        let body: Value = test::read_body_json(response).await;
        assert_eq!(body["data"]["role"], expected);
    }
}

#[actix_web::test]
async fn test_expiry_endpoint() {
    let app = app!();
    let response = test::call_service(
        &app,
        test::TestRequest::put()
            .uri("/session/username")
            .set_json(json!("JohnDoe"))
            .to_request(),
    )
    .await;
    let issued = set_cookie(&response).unwrap();
    assert!(issued.contains("Max-Age=1209600"));
    let cookie = request_cookie(&issued);

    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/session/expiry")
            .insert_header((header::COOKIE, cookie.clone()))
            .set_json(json!({ "seconds": 0 }))
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let issued = set_cookie(&response).unwrap();
    assert!(!issued.contains("Max-Age"));
    let body: Value = test::read_body_json(response).await;
    assert_eq!(body["expire_at_browser_close"], json!(true));

    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/session/expiry")
            .insert_header((header::COOKIE, cookie))
            .set_json(json!({ "at": "2000-01-01T00:00:00Z" }))
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_delete_value() {
    let app = app!();
    let response = test::call_service(
        &app,
        test::TestRequest::put()
            .uri("/session/theme")
            .set_json(json!("dark"))
            .to_request(),
    )
    .await;
    let cookie = request_cookie(&set_cookie(&response).unwrap());

    let response = test::call_service(
        &app,
        test::TestRequest::delete()
            .uri("/session/theme")
            .insert_header((header::COOKIE, cookie.clone()))
            .to_request(),
    )
    .await;
    let body: Value = test::read_body_json(response).await;
    assert_eq!(body["removed"], json!("dark"));

    let response = test::call_service(
        &app,
        test::TestRequest::delete()
            .uri("/session/theme")
            .insert_header((header::COOKIE, cookie))
            .to_request(),
    )
    .await;
    assert!(set_cookie(&response).is_none());
    let body: Value = test::read_body_json(response).await;
    assert_eq!(body["removed"], Value::Null);
}

#[actix_web::test]
async fn test_forged_cookie_is_ignored() {
    let app = app!();
    let response = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/visits")
            .insert_header((header::COOKIE, "satchel_session=forged.AAAAAAAAAAA.AAAA"))
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = test::read_body_json(response).await;
    assert_eq!(body["visits"], json!(1));
}
