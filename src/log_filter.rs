use tracing::{metadata::LevelFilter, Level, Metadata};
use tracing_subscriber::layer::{Context, Filter};

pub struct LogFilter {
    level: Level,
}

impl LogFilter {
    pub fn new(level: Level) -> Self {
        LogFilter { level }
    }
}

impl<S> Filter<S> for LogFilter {
    fn enabled(&self, meta: &Metadata<'_>, _cx: &Context<'_, S>) -> bool {
        if meta.level() > &self.level {
            return false;
        }
        let target = meta.target();

        // dependencies are quiet unless they are the http access log
        target.starts_with("ecs_service_discovery")
            || target.starts_with("tower_http::trace::on_response")
    }

    fn max_level_hint(&self) -> Option<LevelFilter> {
        Some(LevelFilter::from(self.level))
    }
}
