//! Echo Privacy Page Runtime
//!
//! Behavior that runs inside a page: the heuristic ad classifier with Shadow
//! DOM traversal, the behavioral interceptor, the consent banner resolver and
//! cosmetic stylesheet injection. Page access goes through the capability
//! traits in [`dom`], and time is supplied by the host.

pub mod classifier;
pub mod config;
pub mod consent;
pub mod cosmetic;
pub mod dom;
pub mod handled;
pub mod interceptor;
pub mod page;
pub mod schedule;
pub mod settings;

pub use classifier::{Classifier, ScanReport, Score};
pub use config::{ClassifierConfig, ConfigError, ConsentConfig, RuntimeConfig};
pub use consent::{BannerState, ConsentResolver, DetectionMethod, Outcome, ResolverEvent};
pub use cosmetic::CosmeticArtifacts;
pub use dom::{Document, DomError, DomNode};
pub use handled::HandledSet;
pub use interceptor::{InstallReport, Interceptor, OpenDecision, PageGlobals};
pub use page::{PageEvent, PageRuntime, Tick};
pub use schedule::Millis;
pub use settings::{Settings, SettingsDiff};
