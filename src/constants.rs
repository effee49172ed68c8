//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Deletion-guard finalizer registered on every active Attester
pub const ATTESTER_FINALIZER: &str = "attester.finalizers.rode.liatr.io";

/// Key inside the signing secret's data that holds the armoured key material
pub const SECRET_KEYS_FIELD: &str = "keys";

/// Label applied to secrets created by the controller
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Value of [`MANAGED_BY_LABEL`] and field manager name for patches
pub const CONTROLLER_NAME: &str = "attester-controller";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default requeue delay after a pass that stopped early following its own write (seconds)
pub const DEFAULT_REQUEUE_AFTER_WRITE_SECS: u64 = 1;

/// Default maximum number of concurrent reconciliations
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: u16 = 10;

/// Error backoff bounds, in minutes
pub const ERROR_BACKOFF_MIN_MINUTES: u64 = 1;
pub const ERROR_BACKOFF_MAX_MINUTES: u64 = 10;

/// How long to wait for the HTTP server to bind before giving up (seconds)
pub const SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Poll interval while waiting for the HTTP server to bind (milliseconds)
pub const SERVER_POLL_INTERVAL_MS: u64 = 50;
