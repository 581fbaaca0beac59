//! Merge rules: scalar defaults every later layer overrides.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
///
/// Tables absent here fall back to their serde defaults; only the knobs operators
/// most often override are seeded so partial files merge key by key.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("budget.total_budget_secs", 900)?
        .set_default("planner.absolute_floor_secs", 30)?
        .set_default("improvement.max_retries", 2)?
        .set_default("improvement.retry_floor_secs", 90)?
        .set_default("quality.pass_tier", "medium")?
        .set_default("alignment.methodology", "category_adjusted")?
        .set_default("logging.level", "info")
}
