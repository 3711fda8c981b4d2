use std::{collections::BTreeMap, time::Duration};

use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use tracing::{error, info, instrument};

use super::{ApiError, AppState, Path};

type ApiResult = Result<Json<Value>, ApiError>;

/// Largest `n` whose Fibonacci term fits in an `i64`.
const MAX_FIBONACCI_N: i64 = 92;

pub async fn health() -> Json<Value> {
	Json(json!({ "message": "up" }))
}

/// Up with probability `f`, down otherwise.
pub async fn health_conditional(Path(f): Path<f64>) -> ApiResult {
	let chance_of_being_up = f.max(0.0);
	if rand::random::<f64>() >= chance_of_being_up {
		return Err(ApiError::internal("down"))
	}

	Ok(Json(json!({ "message": "up" })))
}

pub async fn fibo_nth(Path(n): Path<i64>) -> ApiResult {
	if n <= 0 {
		return Err(ApiError::unprocessable("n must be a positive integer"))
	}
	if n > MAX_FIBONACCI_N {
		return Err(ApiError::unprocessable(format!("n must not exceed {}", MAX_FIBONACCI_N)))
	}

	info!("calculating fibonacci Nth term for n={}", n);
	let term = fibonacci(n);
	info!("calculated fibonacci Nth term for n={}: {}", n, term);

	Ok(Json(json!({ "n": n, "term": term })))
}

fn fibonacci(n: i64) -> i64 {
	let (mut previous, mut current) = (0i64, 1i64);
	for _ in 1..n {
		(previous, current) = (current, previous + current);
	}
	current
}

/// Adds `n` to counter `id` through the bound backend.
#[instrument(skip(state))]
pub async fn sum(State(state): State<AppState>, Path((id, n)): Path<(String, i64)>) -> ApiResult {
	let value = state.backend.add_and_get(&id, n).await?;

	Ok(Json(json!({ "id": id, "value": value })))
}

pub async fn echo(Path(message): Path<String>) -> Json<Value> {
	info!("echo: {}", message);
	Json(json!({ "message": message }))
}

/// Echoes `message` after `delay` milliseconds.
pub async fn delayed_echo(Path((message, delay)): Path<(String, f64)>) -> ApiResult {
	let delay = match delay >= 0.0 {
		true => Duration::try_from_secs_f64(delay / 1000.0).ok(),
		false => None,
	}
	.ok_or_else(|| ApiError::unprocessable("delay must be a positive float"))?;

	info!("will echo after {:?}: {}", delay, message);
	tokio::time::sleep(delay).await;
	info!("echo after {:?}: {}", delay, message);

	Ok(Json(json!({ "message": message })))
}

pub async fn env_vars() -> Json<BTreeMap<String, String>> {
	Json(std::env::vars().collect())
}

pub async fn env_var(Path(name): Path<String>) -> ApiResult {
	match std::env::var(&name) {
		Ok(value) => Ok(Json(json!({ name: value }))),
		Err(_) => Err(ApiError::new(StatusCode::NOT_FOUND, format!("{} is not set", name))),
	}
}

pub async fn hostname() -> ApiResult {
	let hostname = hostname::get().map_err(|e| {
		error!("failed to read hostname: {}", e);
		ApiError::internal(e.to_string())
	})?;

	Ok(Json(json!({ "hostname": hostname.to_string_lossy() })))
}

/// Retains `size` more bytes until the next `/heap/free`.
pub async fn leak(State(state): State<AppState>, Path(size): Path<i64>) -> ApiResult {
	let size = usize::try_from(size)
		.ok()
		.filter(|size| *size > 0)
		.ok_or_else(|| ApiError::unprocessable("{size} shall be a positive integer"))?;

	let mut chunk = Vec::new();
	chunk.try_reserve_exact(size).map_err(|e| {
		error!("failed to retain {} bytes: {}", size, e);
		ApiError::internal(format!("cannot retain {} bytes: {}", size, e))
	})?;
	// Non-zero fill so the pages are actually committed.
	chunk.resize(size, 1u8);
	let chunk = chunk.into_boxed_slice();

	let mut heap = state.heap.lock().map_err(|_| ApiError::internal("heap state poisoned"))?;
	heap.chunks.push(chunk);
	heap.retained += size as u64;
	info!("leaked {} bytes of heap for a total of {} bytes", size, heap.retained);

	Ok(Json(json!({ "retainedHeap": heap.retained })))
}

pub async fn free(State(state): State<AppState>) -> ApiResult {
	let mut heap = state.heap.lock().map_err(|_| ApiError::internal("heap state poisoned"))?;
	heap.chunks.clear();
	heap.chunks.shrink_to_fit();
	heap.retained = 0;
	info!("released leaked heap");

	Ok(Json(json!({ "retainedHeap": 0 })))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fibonacci_terms() {
		assert_eq!(fibonacci(1), 1);
		assert_eq!(fibonacci(2), 1);
		assert_eq!(fibonacci(10), 55);
		assert_eq!(fibonacci(MAX_FIBONACCI_N), 7_540_113_804_746_346_429);
	}
}
