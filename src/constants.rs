//! Shared constants for krateoctl.

use std::time::Duration;

/// Default name of the main configuration file.
pub const DEFAULT_CONFIG_FILE: &str = "krateo.yaml";

/// Default name of the user overrides file. Profile files live next to it as
/// `krateo-overrides.<profile>.yaml`.
pub const DEFAULT_OVERRIDES_FILE: &str = "krateo-overrides.yaml";

/// Namespace used for steps that do not declare one.
pub const DEFAULT_NAMESPACE: &str = "krateo-system";

/// Default timeout for chart install/upgrade operations.
pub const DEFAULT_CHART_TIMEOUT: Duration = Duration::from_secs(300);

/// Default number of release revisions helm keeps.
pub const DEFAULT_MAX_HISTORY: u32 = 10;

/// Upper bound for a single kubectl invocation.
pub const KUBECTL_TIMEOUT: Duration = Duration::from_secs(120);

/// Slack added on top of the chart timeout before a helm invocation is killed.
pub const HELM_TIMEOUT_GRACE: Duration = Duration::from_secs(60);

/// Field manager name used for server-side apply.
pub const FIELD_MANAGER: &str = "krateoctl";

/// Environment variable disabling spinners.
pub const NO_PROGRESS_ENV: &str = "KRATEOCTL_NO_PROGRESS";
