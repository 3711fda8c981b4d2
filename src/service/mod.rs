//! HTTP surface of servicebox.
//!
//! Every route lives under `/api/v2`. Successful responses and errors are JSON; errors always
//! have the shape `{ "message": "..." }`.

use std::sync::{Arc, Mutex};

use axum::{
	extract::FromRequestParts,
	http::{request::Parts, StatusCode},
	response::{IntoResponse, Response},
	routing::get,
	Json, Router,
};
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::{Backend, BackendError};

pub mod handlers;
pub mod server;

/// Memory deliberately retained by the heap leak endpoints.
#[derive(Debug, Default)]
pub struct LeakedHeap {
	chunks: Vec<Box<[u8]>>,
	retained: u64,
}

/// State shared by every request.
#[derive(Clone)]
pub struct AppState {
	/// The bound counter backend used by `/calc/sum`.
	pub backend: Arc<dyn Backend>,
	pub heap: Arc<Mutex<LeakedHeap>>,
}

impl AppState {
	pub fn new(backend: Arc<dyn Backend>) -> Self {
		Self { backend, heap: Arc::new(Mutex::new(LeakedHeap::default())) }
	}
}

/// Error response, rendered as `{ "message": ... }`.
#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	message: String,
}

impl ApiError {
	pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
		Self { status, message: message.into() }
	}

	pub fn unprocessable(message: impl Into<String>) -> Self {
		Self::new(StatusCode::UNPROCESSABLE_ENTITY, message)
	}

	pub fn internal(message: impl Into<String>) -> Self {
		Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
	}
}

impl From<BackendError> for ApiError {
	fn from(e: BackendError) -> Self {
		Self::internal(e.to_string())
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		(self.status, Json(json!({ "message": self.message }))).into_response()
	}
}

/// [`axum::extract::Path`] whose rejections are rendered as [`ApiError`]s.
pub struct Path<T>(pub T);

impl<T, S> FromRequestParts<S> for Path<T>
where
	T: DeserializeOwned + Send,
	S: Send + Sync,
{
	type Rejection = ApiError;

	async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
		match axum::extract::Path::<T>::from_request_parts(parts, state).await {
			Ok(axum::extract::Path(value)) => Ok(Self(value)),
			Err(rejection) => Err(ApiError::new(rejection.status(), rejection.body_text())),
		}
	}
}

/// Builds the `/api/v2` router over `state`.
pub fn router(state: AppState) -> Router {
	let api = Router::new()
		.route("/health", get(handlers::health))
		.route("/health/{f}", get(handlers::health_conditional))
		.route("/calc/fibo-nth/{n}", get(handlers::fibo_nth))
		.route("/calc/sum/{id}/{n}", get(handlers::sum))
		.route("/echo/{message}", get(handlers::echo))
		.route("/echo/{message}/{delay}", get(handlers::delayed_echo))
		.route("/env/vars", get(handlers::env_vars))
		.route("/env/vars/{name}", get(handlers::env_var))
		.route("/env/hostname", get(handlers::hostname))
		.route("/heap/leak/{size}", get(handlers::leak))
		.route("/heap/free", get(handlers::free));

	Router::new().nest("/api/v2", api).with_state(state)
}

#[cfg(test)]
mod tests {
	use axum::{body::Body, http::Request};
	use tower::ServiceExt;

	use super::*;
	use crate::storage::memory::MemoryBackend;

	async fn app() -> Router {
		let backend = MemoryBackend::new();
		backend.bind().await.unwrap();
		router(AppState::new(Arc::new(backend)))
	}

	async fn call(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
		let response = app
			.clone()
			.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
			.await
			.unwrap();

		let status = response.status();
		let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
		(status, serde_json::from_slice(&body).unwrap())
	}

	#[tokio::test]
	async fn health_is_up() {
		let app = app().await;

		assert_eq!(call(&app, "/api/v2/health").await, (StatusCode::OK, json!({ "message": "up" })));
		assert_eq!(
			call(&app, "/api/v2/health/1").await,
			(StatusCode::OK, json!({ "message": "up" }))
		);
		assert_eq!(
			call(&app, "/api/v2/health/-3").await,
			(StatusCode::INTERNAL_SERVER_ERROR, json!({ "message": "down" }))
		);
	}

	#[tokio::test]
	async fn sum_accumulates() {
		let app = app().await;

		assert_eq!(
			call(&app, "/api/v2/calc/sum/0/1").await,
			(StatusCode::OK, json!({ "id": "0", "value": 1 }))
		);
		assert_eq!(
			call(&app, "/api/v2/calc/sum/0/2").await,
			(StatusCode::OK, json!({ "id": "0", "value": 3 }))
		);
		assert_eq!(
			call(&app, "/api/v2/calc/sum/0/-5").await,
			(StatusCode::OK, json!({ "id": "0", "value": -2 }))
		);
	}

	#[tokio::test]
	async fn sum_on_unbound_backend_is_an_internal_error() {
		let app = router(AppState::new(Arc::new(MemoryBackend::new())));

		let (status, body) = call(&app, "/api/v2/calc/sum/0/1").await;

		assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
		assert_eq!(
			body["message"],
			"memory backend is not properly initialized. Have you called bind()?"
		);
	}

	#[tokio::test]
	async fn fibonacci() {
		let app = app().await;

		assert_eq!(
			call(&app, "/api/v2/calc/fibo-nth/30").await,
			(StatusCode::OK, json!({ "n": 30, "term": 832040 }))
		);
		assert_eq!(call(&app, "/api/v2/calc/fibo-nth/0").await.0, StatusCode::UNPROCESSABLE_ENTITY);
		assert_eq!(call(&app, "/api/v2/calc/fibo-nth/93").await.0, StatusCode::UNPROCESSABLE_ENTITY);
	}

	#[tokio::test]
	async fn echo() {
		let app = app().await;

		assert_eq!(
			call(&app, "/api/v2/echo/hello").await,
			(StatusCode::OK, json!({ "message": "hello" }))
		);
		assert_eq!(
			call(&app, "/api/v2/echo/hello/10").await,
			(StatusCode::OK, json!({ "message": "hello" }))
		);
		assert_eq!(
			call(&app, "/api/v2/echo/hello/-1").await,
			(StatusCode::UNPROCESSABLE_ENTITY, json!({ "message": "delay must be a positive float" }))
		);
	}

	#[tokio::test]
	async fn environment() {
		let app = app().await;
		std::env::set_var("SERVICEBOX_TEST_VAR", "42");

		assert_eq!(
			call(&app, "/api/v2/env/vars/SERVICEBOX_TEST_VAR").await,
			(StatusCode::OK, json!({ "SERVICEBOX_TEST_VAR": "42" }))
		);
		assert_eq!(call(&app, "/api/v2/env/vars").await.1["SERVICEBOX_TEST_VAR"], "42");
		assert_eq!(
			call(&app, "/api/v2/env/vars/SERVICEBOX_SURELY_UNSET").await.0,
			StatusCode::NOT_FOUND
		);
		assert!(call(&app, "/api/v2/env/hostname").await.1["hostname"].is_string());
	}

	#[tokio::test]
	async fn malformed_path_parameters_are_json_errors() {
		let app = app().await;

		for uri in ["/api/v2/calc/sum/0/abc", "/api/v2/calc/fibo-nth/x", "/api/v2/echo/hi/soon"] {
			let (status, body) = call(&app, uri).await;

			assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
			assert!(body["message"].is_string(), "{}", uri);
		}
	}

	#[tokio::test]
	async fn unallocatable_leak_is_an_error() {
		let app = app().await;

		let (status, body) = call(&app, "/api/v2/heap/leak/9223372036854775807").await;

		assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
		assert!(body["message"].as_str().unwrap().starts_with("cannot retain"));
		assert_eq!(
			call(&app, "/api/v2/heap/leak/16").await,
			(StatusCode::OK, json!({ "retainedHeap": 16 }))
		);
	}

	#[tokio::test]
	async fn heap_leak_and_free() {
		let app = app().await;

		assert_eq!(
			call(&app, "/api/v2/heap/leak/1024").await,
			(StatusCode::OK, json!({ "retainedHeap": 1024 }))
		);
		assert_eq!(
			call(&app, "/api/v2/heap/leak/2048").await,
			(StatusCode::OK, json!({ "retainedHeap": 3072 }))
		);
		assert_eq!(call(&app, "/api/v2/heap/leak/0").await.0, StatusCode::UNPROCESSABLE_ENTITY);
		assert_eq!(
			call(&app, "/api/v2/heap/free").await,
			(StatusCode::OK, json!({ "retainedHeap": 0 }))
		);
	}
}
