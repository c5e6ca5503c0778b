//! pooldash-state: Session state and stateful dashboard components
//!
//! Every component is built on an injected [`AppState`] and talks to the pool
//! only through its [`pooldash_client::PoolApi`]:
//! - Namespace filter initialization
//! - Job listing, bulk deletion and the deployment wizard
//! - Node, service, overview and monitoring panels
//! - Log polling
//! - Persisted preferences and search debouncing
//!
//! Loads are generation-stamped: a result that arrives after a newer load
//! was started is dropped.

pub mod bulk;
pub mod debounce;
pub mod jobs;
pub mod logs;
pub mod monitoring;
pub mod namespace;
pub mod nodes;
pub mod notice;
pub mod overview;
pub mod panel;
pub mod prefs;
pub mod services;
pub mod session;
pub mod wizard;

pub use bulk::{run_sequential, BulkFailure, BulkOutcome};
pub use debounce::Debouncer;
pub use jobs::{bulk_delete_notice, JobBoard, JobPage};
pub use logs::{LogPoller, LogTarget};
pub use monitoring::{Monitor, MonitorFilters};
pub use namespace::{NamespaceFilter, NamespaceScope};
pub use nodes::{NodeBoard, NodeDetail};
pub use notice::Notice;
pub use overview::{DashboardOverview, Overview};
pub use panel::{LoadOutcome, Panel, Ticket};
pub use prefs::{PreferenceStore, Preferences};
pub use services::{ServiceBoard, NO_SERVICES};
pub use session::{AppState, AuthState, ConnectionState};
pub use wizard::{DeploymentWizard, WizardStep, WizardView};
