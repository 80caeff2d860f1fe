//! Single-flight registry for credential exchanges.
//!
//! At most one exchange per [`FlightKind`] runs at a time. The exchange executes on its own
//! Tokio task, so a caller that gives up (drops its future or gets cancelled) never aborts
//! the exchange other callers are waiting on. Every waiter observes the same outcome and the
//! registry entry is cleared as soon as the exchange settles, success or failure.

// crates.io
use futures::{
	FutureExt,
	future::{BoxFuture, Shared},
};
// self
use crate::{_prelude::*, auth::Credential, error::AuthenticationError};

/// Outcome broadcast to every waiter of a flight.
pub type FlightResult = Result<Credential, AuthenticationError>;

type SharedFlight = Shared<BoxFuture<'static, FlightResult>>;

/// Credential lifecycle operations guarded by the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlightKind {
	/// Client-credentials acquisition (cache-first).
	Authenticate,
	/// Refresh-token exchange.
	Refresh,
}
impl FlightKind {
	/// Returns a stable label suitable for logs.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlightKind::Authenticate => "authenticate",
			FlightKind::Refresh => "refresh",
		}
	}
}

/// How a caller got hold of its credential.
pub(crate) enum Flight {
	/// A usable credential appeared before any exchange was needed.
	Ready(Credential),
	/// The caller joined an exchange started by someone else.
	Joined(SharedFlight),
	/// The caller started the exchange.
	Started(SharedFlight),
}
impl Flight {
	pub(crate) fn is_joined(&self) -> bool {
		matches!(self, Flight::Joined(_))
	}

	pub(crate) async fn wait(self) -> FlightResult {
		match self {
			Flight::Ready(credential) => Ok(credential),
			Flight::Joined(flight) | Flight::Started(flight) => flight.await,
		}
	}
}

#[derive(Default)]
pub(crate) struct FlightRegistry {
	flights: Mutex<HashMap<FlightKind, SharedFlight>>,
}
impl FlightRegistry {
	/// Joins the running flight of `kind` or starts one.
	///
	/// `recheck` runs under the registry lock when no flight is running; a credential it
	/// returns short-circuits the exchange. This closes the window between a caller's own
	/// validity check and a flight that settled just before the caller arrived.
	pub(crate) fn join_or_start<R, S, Fut>(
		self: &Arc<Self>,
		kind: FlightKind,
		recheck: R,
		start: S,
	) -> Flight
	where
		R: FnOnce() -> Option<Credential>,
		S: FnOnce() -> Fut,
		Fut: 'static + Send + Future<Output = FlightResult>,
	{
		let mut flights = self.flights.lock();

		if let Some(running) = flights.get(&kind) {
			return Flight::Joined(running.clone());
		}
		if let Some(credential) = recheck() {
			return Flight::Ready(credential);
		}

		let exchange = start();
		let registry = self.clone();
		// The task cannot remove its entry before it is inserted: removal takes the lock
		// held here.
		let handle = tokio::spawn(async move {
			let result = exchange.await;

			registry.flights.lock().remove(&kind);

			result
		});
		let flight = async move {
			handle.await.unwrap_or_else(|e| {
				Err(AuthenticationError::new(format!("Credential {} task failed: {e}", kind.as_str())))
			})
		}
		.boxed()
		.shared();

		flights.insert(kind, flight.clone());

		Flight::Started(flight)
	}

	#[cfg(test)]
	fn is_running(&self, kind: FlightKind) -> bool {
		self.flights.lock().contains_key(&kind)
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::{
		sync::atomic::{AtomicU32, Ordering},
		time::Duration as StdDuration,
	};
	// self
	use super::*;

	fn credential(token: &str) -> Credential {
		Credential::builder()
			.access_token(token)
			.expires_in(Duration::hours(1))
			.build()
			.expect("Flight credential fixture should build.")
	}

	#[tokio::test]
	async fn concurrent_callers_share_one_exchange() {
		let registry = Arc::new(FlightRegistry::default());
		let starts = Arc::new(AtomicU32::new(0));
		let mut flights = Vec::new();

		for _ in 0..8 {
			let starts = starts.clone();

			flights.push(registry.join_or_start(
				FlightKind::Authenticate,
				|| None,
				move || async move {
					starts.fetch_add(1, Ordering::SeqCst);
					tokio::time::sleep(StdDuration::from_millis(20)).await;

					Ok(credential("shared"))
				},
			));
		}

		assert_eq!(flights.iter().filter(|flight| flight.is_joined()).count(), 7);

		for flight in flights {
			let credential = flight.wait().await.expect("Every waiter should see the credential.");

			assert_eq!(credential.access_token.expose(), "shared");
		}

		assert_eq!(starts.load(Ordering::SeqCst), 1);
		assert!(!registry.is_running(FlightKind::Authenticate));
	}

	#[tokio::test]
	async fn failures_clear_the_entry() {
		let registry = Arc::new(FlightRegistry::default());
		let failed = registry
			.join_or_start(FlightKind::Refresh, || None, || async {
				Err(AuthenticationError::new("invalid_grant"))
			})
			.wait()
			.await;

		assert_eq!(failed.expect_err("Failure should be broadcast.").reason, "invalid_grant");
		assert!(!registry.is_running(FlightKind::Refresh));

		let retried = registry
			.join_or_start(FlightKind::Refresh, || None, || async { Ok(credential("second")) })
			.wait()
			.await
			.expect("A later call should start a new exchange.");

		assert_eq!(retried.access_token.expose(), "second");
	}

	#[tokio::test]
	async fn dropped_waiters_do_not_cancel_the_exchange() {
		let registry = Arc::new(FlightRegistry::default());
		let finished = Arc::new(AtomicU32::new(0));
		let done = finished.clone();
		let first = registry.join_or_start(FlightKind::Authenticate, || None, move || async move {
			tokio::time::sleep(StdDuration::from_millis(20)).await;
			done.fetch_add(1, Ordering::SeqCst);

			Ok(credential("survivor"))
		});
		let second = registry.join_or_start(FlightKind::Authenticate, || None, || async {
			Ok(credential("never"))
		});

		drop(first);

		let credential = second.wait().await.expect("Remaining waiter should get the credential.");

		assert_eq!(credential.access_token.expose(), "survivor");
		assert_eq!(finished.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn recheck_short_circuits_when_idle() {
		let registry = Arc::new(FlightRegistry::default());
		let flight = registry.join_or_start(
			FlightKind::Authenticate,
			|| Some(credential("fresh")),
			|| async { Err(AuthenticationError::new("should not run")) },
		);

		assert!(matches!(flight, Flight::Ready(_)));
		assert_eq!(flight.wait().await.expect("Ready flight.").access_token.expose(), "fresh");
	}
}
