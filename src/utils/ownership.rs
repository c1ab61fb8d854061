use crate::core::error::Error;
use crate::store::UserStore;
use crate::types::product::Product;
use crate::types::user::{Session, UserId};

/// Anything with a single owning account.
pub(crate) trait Owned {
    fn owner(&self) -> UserId;
}

impl Owned for Product {
    fn owner(&self) -> UserId {
        self.owner
    }
}

/// Allows the owner outright; anyone else must be an admin. The requester's
/// record is only loaded when they are not the owner.
pub(crate) async fn ensure_owner_or_admin<R: Owned>(
    session: &Session,
    resource: &R,
    users: &dyn UserStore,
) -> Result<(), Error> {
    if resource.owner() == session.user_id {
        return Ok(());
    }

    match users.find_by_id(session.user_id).await? {
        Some(user) if user.is_admin() => {
            tracing::info!(
                admin = %user.username,
                owner = resource.owner(),
                "admin override on foreign resource"
            );
            Ok(())
        }
        _ => Err(Error::Forbidden),
    }
}
