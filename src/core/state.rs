use chrono::Duration;

use crate::controllers::product::ProductController;
use crate::controllers::upload::UploadController;
use crate::controllers::user::UserController;
use crate::core::config::Args;
use crate::core::error::ConfigError;
use crate::store::Stores;
use crate::utils::auth::SessionKeys;

/// Everything a handler can reach. Built once in [`crate::run`] from the
/// loaded configuration and cloned into each request.
#[derive(Clone, Debug)]
pub(crate) struct AppState {
    pub(crate) sessions: SessionKeys,
    pub(crate) user_controller: UserController,
    pub(crate) product_controller: ProductController,
    pub(crate) upload_controller: UploadController,
}

impl AppState {
    pub(crate) fn new(args: &Args, stores: Stores) -> Result<Self, ConfigError> {
        let sessions = SessionKeys::new(&args.secret, Duration::seconds(args.token_lifetime_secs));
        let upload_controller = UploadController::new(args.upload_dir.clone());

        Ok(AppState {
            user_controller: UserController::new(
                stores.users.clone(),
                sessions.clone(),
                upload_controller.clone(),
                args.bcrypt_cost,
                args.file_base_url.clone(),
            )?,
            product_controller: ProductController::new(
                stores.products,
                stores.users,
                upload_controller.clone(),
            ),
            upload_controller,
            sessions,
        })
    }
}
