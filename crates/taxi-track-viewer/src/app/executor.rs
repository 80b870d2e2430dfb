//! Runs controller requests off the UI thread
//!
//! Each [`Request`] becomes one `spawn_blocking` job; its [`SessionEvent`] goes back
//! through the session channel and the UI is asked to repaint so it drains the channel.

use std::sync::Arc;
use taxi_track_lib::{Request, RouteRepository, RoutingProvider, SessionEvent};
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;

pub struct Executor {
    repository: Arc<RouteRepository>,
    router: Arc<dyn RoutingProvider>,
    events: UnboundedSender<SessionEvent>,
    runtime: Option<Handle>,
    repaint: Option<egui::Context>,
}

impl Executor {
    pub fn new(
        repository: RouteRepository,
        router: Box<dyn RoutingProvider>,
        events: UnboundedSender<SessionEvent>,
    ) -> Self {
        let runtime = Handle::try_current().ok();
        if runtime.is_none() {
            tracing::warn!("No Tokio runtime, requests will run on the UI thread");
        }
        Self {
            repository: Arc::new(repository),
            router: Arc::from(router),
            events,
            runtime,
            repaint: None,
        }
    }

    /// Wake this context whenever a result is delivered
    pub fn with_repaint(mut self, ctx: egui::Context) -> Self {
        self.repaint = Some(ctx);
        self
    }

    pub fn describe(&self) -> String {
        format!(
            "{} via {}",
            self.repository.describe(),
            self.router.name()
        )
    }

    pub fn submit(&self, request: Request) {
        tracing::trace!("Submitting {request:?}");
        let repository = self.repository.clone();
        let router = self.router.clone();
        let events = self.events.clone();
        let repaint = self.repaint.clone();

        let job = move || {
            profiling::scope!("Executor::job");
            let event = request.execute(&repository, router.as_ref());
            if events.send(event).is_err() {
                tracing::debug!("Session closed before a result arrived");
            }
            if let Some(ctx) = repaint {
                ctx.request_repaint();
            }
        };

        match &self.runtime {
            Some(handle) => {
                handle.spawn_blocking(job);
            }
            None => job(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taxi_track_lib::routing::StraightLineRouter;
    use taxi_track_lib::{Generation, GeoPoint, Period, StaticRouteSource};
    use tokio::sync::mpsc;

    const ROUTES: &str = r#"{ "noon": { "coordinates": [ { "lat": 18.52, "lng": 73.85 } ] } }"#;

    fn executor(events: UnboundedSender<SessionEvent>) -> Executor {
        Executor::new(
            RouteRepository::new(StaticRouteSource::new(ROUTES)),
            Box::new(StraightLineRouter::default()),
            events,
        )
    }

    #[test]
    fn test_runs_inline_without_runtime() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let executor = executor(tx);
        assert!(executor.describe().ends_with("via straight-line"));

        executor.submit(Request::ListPeriods);
        match rx.try_recv().unwrap() {
            SessionEvent::PeriodsListed { result } => {
                assert_eq!(result.unwrap(), vec![Period::from("noon")]);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_runs_on_blocking_pool() {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .build()
            .unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let executor = rt.block_on(async { executor(tx) });

        executor.submit(Request::LoadRoute {
            generation: Generation::default(),
            period: Period::from("noon"),
        });
        let event = rt.block_on(rx.recv()).unwrap();
        match event {
            SessionEvent::RouteLoaded { result, .. } => {
                assert_eq!(result.unwrap().start(), GeoPoint::new(18.52, 73.85));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
