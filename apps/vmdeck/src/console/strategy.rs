use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use super::agent::{Agent, AttachError, MainChannel, SurfaceConnector};
use super::error::ConsoleError;
use super::surface::SurfaceRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Direct,
    Nested,
    Fallback,
}

/// How a resolved agent gets bound to the display surface.
#[derive(Clone)]
pub enum AttachStrategy {
    /// `agent.connect_display`.
    Direct(Arc<dyn SurfaceConnector>),
    /// `agent.main.connect_display`.
    Nested(Arc<dyn SurfaceConnector>),
    /// No capability: write the surface into `agent.main.display`.
    Fallback(Option<Arc<MainChannel>>),
}

impl AttachStrategy {
    /// Probes the agent's capabilities in priority order. Never fails: an
    /// agent without any capability gets the fallback strategy.
    pub fn resolve(agent: &Agent) -> Self {
        if let Some(connector) = agent.connector() {
            return AttachStrategy::Direct(connector.clone());
        }
        if let Some(connector) = agent.main().and_then(|main| main.connector()) {
            return AttachStrategy::Nested(connector.clone());
        }
        AttachStrategy::Fallback(agent.main().cloned())
    }

    /// Like [`Self::resolve`] but rejects strategies that can never attach.
    pub fn resolve_usable(agent: &Agent) -> Result<Self, ConsoleError> {
        let strategy = Self::resolve(agent);
        debug!(target: "vmdeck::agent", ?agent, strategy = ?strategy.kind(), "resolved attach strategy");
        if strategy.is_usable() {
            Ok(strategy)
        } else {
            warn!(target: "vmdeck::agent", ?agent, "agent exposes no display capability");
            Err(ConsoleError::NoAttachCapability)
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            AttachStrategy::Direct(_) => StrategyKind::Direct,
            AttachStrategy::Nested(_) => StrategyKind::Nested,
            AttachStrategy::Fallback(_) => StrategyKind::Fallback,
        }
    }

    pub fn is_usable(&self) -> bool {
        !matches!(self, AttachStrategy::Fallback(None))
    }

    pub fn attach(&self, surface: &SurfaceRef) -> Result<bool, AttachError> {
        match self {
            AttachStrategy::Direct(connector) | AttachStrategy::Nested(connector) => {
                connector.connect_display(surface)
            }
            AttachStrategy::Fallback(Some(main)) => {
                main.assign_display(surface.clone());
                Ok(true)
            }
            AttachStrategy::Fallback(None) => Ok(false),
        }
    }
}

impl fmt::Debug for AttachStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AttachStrategy").field(&self.kind()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::surface::{
        DISPLAY_SURFACE_ID, HeadlessHost, SurfaceHost, SurfaceKind,
    };
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl SurfaceConnector for Recorder {
        fn connect_display(&self, surface: &SurfaceRef) -> Result<bool, AttachError> {
            self.calls.lock().push(surface.id().to_owned());
            Ok(true)
        }
    }

    fn display() -> SurfaceRef {
        HeadlessHost::new().create(DISPLAY_SURFACE_ID, SurfaceKind::Display)
    }

    #[test_timeout::timeout]
    fn direct_capability_wins_over_nested() {
        let direct = Arc::new(Recorder::default());
        let nested = Arc::new(Recorder::default());
        let agent = Agent::new()
            .with_connector(direct.clone())
            .with_main(Arc::new(MainChannel::with_connector(nested.clone())));

        let strategy = AttachStrategy::resolve(&agent);
        assert_eq!(strategy.kind(), StrategyKind::Direct);
        assert!(strategy.attach(&display()).unwrap());
        assert_eq!(direct.calls.lock().len(), 1);
        assert!(nested.calls.lock().is_empty());
    }

    #[test_timeout::timeout]
    fn nested_capability_is_used_when_direct_is_missing() {
        let nested = Arc::new(Recorder::default());
        let agent = Agent::new().with_main(Arc::new(MainChannel::with_connector(nested.clone())));

        let strategy = AttachStrategy::resolve_usable(&agent).unwrap();
        assert_eq!(strategy.kind(), StrategyKind::Nested);
        strategy.attach(&display()).unwrap();
        assert_eq!(nested.calls.lock().as_slice(), [DISPLAY_SURFACE_ID]);
    }

    #[test_timeout::timeout]
    fn fallback_assigns_display_onto_main_channel() {
        let main = Arc::new(MainChannel::new());
        let agent = Agent::new().with_main(main.clone());
        let surface = display();

        let strategy = AttachStrategy::resolve_usable(&agent).unwrap();
        assert_eq!(strategy.kind(), StrategyKind::Fallback);
        assert!(strategy.attach(&surface).unwrap());
        assert_eq!(main.display(), Some(surface));
    }

    #[test_timeout::timeout]
    fn fallback_without_main_reports_failure() {
        let agent = Agent::new();

        let strategy = AttachStrategy::resolve(&agent);
        assert_eq!(strategy.kind(), StrategyKind::Fallback);
        assert!(!strategy.attach(&display()).unwrap());
        assert!(matches!(
            AttachStrategy::resolve_usable(&agent),
            Err(ConsoleError::NoAttachCapability)
        ));
    }
}
