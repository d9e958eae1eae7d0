//! Counter registry: named metric definitions.

use tracing::{debug, info};
use vmscale_core::epoch_secs;
use vmscale_state::{Counter, CounterId, Provider, Source};

use crate::commands::CreateCounter;
use crate::context::CallContext;
use crate::error::{AutoScaleError, AutoScaleResult};
use crate::manager::AutoScaleManager;

impl AutoScaleManager {
    /// Validate and persist a counter.
    ///
    /// The provider must be known and the source must be one the provider
    /// reports. `value` is stored exactly as given.
    pub fn create_counter(&self, ctx: &CallContext, cmd: &CreateCounter) -> AutoScaleResult<Counter> {
        let counter = validate_counter(cmd).inspect_err(|e| {
            debug!(user = ctx.user_id, error = %e, "counter rejected");
        })?;

        let counter = self.repo.persist_counter(counter)?;
        info!(
            counter = counter.id,
            name = %counter.name,
            provider = %counter.provider,
            source = %counter.source,
            user = ctx.user_id,
            "counter created"
        );
        Ok(counter)
    }

    pub fn find_counter(&self, id: CounterId) -> AutoScaleResult<Counter> {
        self.repo
            .find_counter(id)?
            .ok_or(AutoScaleError::NotFound { entity: "counter", id })
    }

    pub fn list_counters(&self) -> AutoScaleResult<Vec<Counter>> {
        Ok(self.repo.list_counters()?)
    }
}

fn validate_counter(cmd: &CreateCounter) -> AutoScaleResult<Counter> {
    if cmd.name.trim().is_empty() {
        return Err(AutoScaleError::invalid("name", "counter name must not be empty"));
    }

    let provider: Provider = cmd.provider.parse()?;
    let source: Source = cmd.source.parse()?;
    if !provider.supports(source) {
        let supported: Vec<&str> = provider
            .supported_sources()
            .iter()
            .map(Source::as_str)
            .collect();
        return Err(AutoScaleError::invalid(
            "source",
            format!(
                "source {source} is not supported by provider {provider} (supported: {})",
                supported.join(", ")
            ),
        ));
    }

    if cmd.value.trim().is_empty() {
        return Err(AutoScaleError::invalid("value", "counter value must not be empty"));
    }

    Ok(Counter {
        id: 0,
        name: cmd.name.clone(),
        provider,
        source,
        value: cmd.value.clone(),
        created_at: epoch_secs(),
    })
}
