//! Login mediator metrics
//!
//! - `sso_remote_exchanges_total` (counter): label `outcome`
//!   (`authenticated`, `rejected`, `transport_error`)
//! - `sso_token_cache_hits_total` (counter)
//! - `sso_users_provisioned_total` (counter)
//!
//! Without an installed recorder these are no-ops.

/// Record one remote login exchange.
pub fn record_exchange(outcome: &'static str) {
    metrics::counter!("sso_remote_exchanges_total", "outcome" => outcome).increment(1);
}

/// Record a login satisfied by a cached remote token.
pub fn record_cache_hit() {
    metrics::counter!("sso_token_cache_hits_total").increment(1);
}

/// Record a local account created from a remote identity.
pub fn record_user_provisioned() {
    metrics::counter!("sso_users_provisioned_total").increment(1);
}
