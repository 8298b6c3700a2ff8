//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Log output emitted by runc when the container entrypoint was built for a
/// different CPU architecture than the node it was started on.
pub const EXEC_FORMAT_ERROR_SIGNATURE: &str =
    "standard_init_linux.go:211: exec user process caused \"exec format error\"\n";

/// Waiting reason the kubelet reports for a container stuck restarting
pub const CRASH_LOOP_BACK_OFF: &str = "CrashLoopBackOff";

/// Well-known node label carrying the node's CPU architecture
pub const ARCH_LABEL: &str = "kubernetes.io/arch";

/// Deprecated architecture label, still set by older kubelets
pub const LEGACY_ARCH_LABEL: &str = "beta.kubernetes.io/arch";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default number of concurrent reconciliation workers
pub const DEFAULT_WORKERS: usize = 1;

/// Default first retry delay for a failing work key (milliseconds)
pub const DEFAULT_QUEUE_BASE_DELAY_MS: u64 = 5;

/// Default ceiling for the per-key retry delay (seconds)
pub const DEFAULT_QUEUE_MAX_DELAY_SECS: u64 = 1000;

/// Default requeue budget per key. Zero means retry forever.
pub const DEFAULT_MAX_RETRIES: u32 = 0;

/// Default maximum number of owner reference hops followed from a Pod
pub const DEFAULT_MAX_OWNER_HOPS: usize = 16;

/// Default cap on how much container log output is read per container (bytes)
pub const DEFAULT_LOG_LIMIT_BYTES: i64 = 64 * 1024;

/// Default timeout applied to every individual Kubernetes API call (seconds)
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 30;
