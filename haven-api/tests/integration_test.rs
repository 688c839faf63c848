use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use haven_api::state::{AppState, Settings};
use haven_api::worker::start_index_sync_worker;
use haven_api::app;
use haven_bus::{ConsumerConfig, Publisher, TopicExchange};
use haven_shared::SEARCH_QUEUE;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    exchange: Arc<TopicExchange>,
    shutdown: watch::Sender<bool>,
    worker: tokio::task::JoinHandle<()>,
}

impl TestApp {
    fn start() -> Self {
        let built = AppState::in_memory(&Settings::default()).unwrap();
        let subscription = built.exchange.subscribe(SEARCH_QUEUE).unwrap();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (worker, _stats) = start_index_sync_worker(
            Box::new(subscription),
            built.synchronizer,
            built.state.metrics.clone(),
            shutdown_rx,
            ConsumerConfig {
                retry_backoff: Duration::from_millis(10),
                error_backoff: Duration::from_millis(10),
            },
        );
        Self {
            router: app(built.state),
            exchange: built.exchange,
            shutdown,
            worker,
        }
    }

    async fn call(&self, method: &str, uri: &str, body: Option<Value>, user: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header("x-user-id", user);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }

    async fn raw(&self, uri: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Poll the search endpoint until `done` holds for the hit list.
    async fn wait_for_search(&self, uri: &str, done: impl Fn(&[Value]) -> bool) -> Vec<Value> {
        for _ in 0..100 {
            let (status, body) = self.call("GET", uri, None, None).await;
            assert_eq!(status, StatusCode::OK);
            let hits = body["hotels"].as_array().cloned().unwrap_or_default();
            if done(&hits) {
                return hits;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("search at {} never reached the expected state", uri);
    }

    async fn stop(self) {
        self.shutdown.send(true).unwrap();
        self.worker.await.unwrap();
    }
}

fn hotel(name: &str, city: &str, rating: f64) -> Value {
    json!({
        "name": name,
        "description": "Rooms near the old town",
        "city": city,
        "address": "1 Main Street",
        "amenities": ["wifi", "breakfast"],
        "rating": rating,
        "price_per_night": 140.0
    })
}

#[tokio::test]
async fn test_health_and_metrics() {
    let app = TestApp::start();

    let (status, body) = app.call("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, _) = app.call("GET", "/api/hotels/search?city=Porto", None, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, text) = app.raw("/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("haven_searches_total 1"), "{}", text);

    app.stop().await;
}

#[tokio::test]
async fn test_hotel_lifecycle_flows_into_search_and_availability() {
    let app = TestApp::start();

    let (status, created) = app.call("POST", "/api/hotels", Some(hotel("Casa Azul", "Porto", 4.6)), None).await;
    assert_eq!(status, StatusCode::CREATED);
    let hotel_id = created["id"].as_str().unwrap().to_string();

    let hits = app
        .wait_for_search("/api/hotels/search?city=Porto", |hits| hits.len() == 1)
        .await;
    assert_eq!(hits[0]["id"], hotel_id.as_str());
    assert!(hits[0].get("availability").is_none());

    let dated = "/api/hotels/search?city=porto&checkIn=2030-05-01&checkOut=2030-05-04";
    let (_, body) = app.call("GET", dated, None, None).await;
    assert_eq!(body["hotels"][0]["availability"], true);

    let booking = json!({
        "hotel_id": hotel_id,
        "check_in": "2030-05-02",
        "check_out": "2030-05-05",
        "guests": 2,
        "total_price": 420.0
    });
    let (status, booked) = app.call("POST", "/api/bookings", Some(booking.clone()), Some("guest-7")).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(booked["status"], "confirmed");
    assert_eq!(booked["user_id"], "guest-7");
    assert!(booked["provider_booking_id"].as_str().unwrap().starts_with("SIM_"));
    let booking_id = booked["id"].as_str().unwrap().to_string();

    // The cached "available" answer must not survive the booking.
    let (_, body) = app.call("GET", dated, None, None).await;
    assert_eq!(body["hotels"][0]["availability"], false);

    let (status, _) = app.call("POST", "/api/bookings", Some(booking), Some("guest-8")).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let availability = format!("/api/availability/{}?checkIn=2030-05-04&checkOut=2030-05-06", hotel_id);
    let (status, body) = app.call("GET", &availability, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available"], false);

    // Back-to-back stays share no night.
    let after = format!("/api/availability/{}?checkIn=2030-05-05&checkOut=2030-05-06", hotel_id);
    let (_, body) = app.call("GET", &after, None, None).await;
    assert_eq!(body["available"], true);

    let (status, mine) = app.call("GET", "/api/bookings/user", None, Some("guest-7")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine.as_array().unwrap().len(), 1);

    let (status, cancelled) = app
        .call(
            "PATCH",
            &format!("/api/bookings/{}/status", booking_id),
            Some(json!({ "status": "cancelled" })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");

    let (_, body) = app.call("GET", &availability, None, None).await;
    assert_eq!(body["available"], true);

    let (status, _) = app
        .call(
            "PATCH",
            &format!("/api/bookings/{}/status", booking_id),
            Some(json!({ "status": "confirmed" })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.call("DELETE", &format!("/api/hotels/{}", hotel_id), None, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    app.wait_for_search("/api/hotels/search?city=Porto", |hits| hits.is_empty())
        .await;

    app.stop().await;
}

#[tokio::test]
async fn test_update_is_reflected_in_search_order() {
    let app = TestApp::start();

    let (_, first) = app.call("POST", "/api/hotels", Some(hotel("First", "Faro", 4.0)), None).await;
    let (_, second) = app.call("POST", "/api/hotels", Some(hotel("Second", "Faro", 3.0)), None).await;
    let second_id = second["id"].as_str().unwrap().to_string();

    let hits = app
        .wait_for_search("/api/hotels/search?city=Faro", |hits| hits.len() == 2)
        .await;
    assert_eq!(hits[0]["id"], first["id"]);

    let (status, _) = app
        .call("PUT", &format!("/api/hotels/{}", second_id), Some(hotel("Second", "Faro", 4.9)), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let hits = app
        .wait_for_search("/api/hotels/search?city=Faro", |hits| {
            hits.first().map(|h| h["id"] == second_id.as_str()).unwrap_or(false)
        })
        .await;
    assert_eq!(hits[0]["rating"], 4.9);

    app.stop().await;
}

#[tokio::test]
async fn test_bad_requests_are_rejected() {
    let app = TestApp::start();

    let (status, body) = app.call("GET", "/api/hotels/search", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("city"));

    let (status, _) = app
        .call("GET", "/api/hotels/search?city=Porto&checkIn=2030-05-04&checkOut=2030-05-01", None, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call("GET", "/api/hotels/search?city=Porto&checkIn=2030-05-04", None, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.call("GET", "/api/hotels/search?city=Porto&size=500", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.call("GET", "/api/hotels/nope", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.call("GET", "/api/bookings/user", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let booking = json!({
        "hotel_id": "h1",
        "check_in": "2030-05-02",
        "check_out": "2030-05-02",
        "guests": 1
    });
    let (status, _) = app.call("POST", "/api/bookings", Some(booking), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let crowd = json!({
        "hotel_id": "h1",
        "check_in": "2030-05-02",
        "check_out": "2030-05-04",
        "guests": 12
    });
    let (status, _) = app.call("POST", "/api/bookings", Some(crowd), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    app.stop().await;
}

#[tokio::test]
async fn test_undecodable_event_is_counted_as_dead_letter() {
    let app = TestApp::start();

    app.exchange
        .publish("hotel.updated", "h1", b"not an event".to_vec())
        .await
        .unwrap();

    for _ in 0..100 {
        let (_, text) = app.raw("/metrics").await;
        if text.contains("haven_dead_letters_total 1") {
            assert!(text.contains("haven_sync_events_total{outcome=\"permanent\"} 1"), "{}", text);
            app.stop().await;
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("dead letter never reported");
}
