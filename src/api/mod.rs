pub mod attendance;
pub mod overtime;

use crate::repo::mysql::MySqlStore;
use crate::service::{
    ports::RoleLookup,
    roles::{NameFallbackRoles, RoleStrategy},
};

/// Picks the configured role source for this request.
pub(crate) fn roles_for<'a>(
    store: &'a MySqlStore,
    fallback: &'a NameFallbackRoles<'a>,
    strategy: RoleStrategy,
) -> &'a dyn RoleLookup {
    match strategy {
        RoleStrategy::Table => store,
        RoleStrategy::TableWithNameFallback => fallback,
    }
}
