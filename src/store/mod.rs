pub(crate) mod memory;
pub(crate) mod postgres;

use async_trait::async_trait;
use std::sync::Arc;

use crate::core::config::{Args, StoreKind};
use crate::core::error::{ConfigError, Error};
use crate::types::product::{
    NewProduct, Page, Product, ProductChanges, ProductFilter, ProductId,
};
use crate::types::user::{NewUser, ProfileChanges, User, UserId};

/// Account persistence. Implementations enforce unique usernames and emails,
/// reporting collisions as [`Error::UsernameTaken`] / [`Error::EmailTaken`].
#[async_trait]
pub(crate) trait UserStore: Send + Sync {
    async fn insert_user(&self, user: NewUser) -> Result<User, Error>;

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, Error>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, Error>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, Error>;

    async fn update_profile(
        &self,
        id: UserId,
        changes: ProfileChanges,
    ) -> Result<Option<User>, Error>;

    /// Returns `false` when no such user exists.
    async fn set_password_hash(&self, id: UserId, password_hash: &str) -> Result<bool, Error>;

    async fn set_avatar(&self, id: UserId, avatar: &str) -> Result<bool, Error>;
}

/// Listing persistence. Every write touches a single record.
#[async_trait]
pub(crate) trait ProductStore: Send + Sync {
    async fn insert_product(&self, owner: UserId, product: NewProduct) -> Result<Product, Error>;

    async fn find_product(&self, id: ProductId) -> Result<Option<Product>, Error>;

    /// Newest first.
    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, Error>;

    /// One page of [`Self::list_products`] together with the total number of
    /// matching products.
    async fn page_products(
        &self,
        filter: &ProductFilter,
        page: Page,
    ) -> Result<(Vec<Product>, usize), Error>;

    async fn update_product(
        &self,
        id: ProductId,
        changes: ProductChanges,
    ) -> Result<Option<Product>, Error>;

    async fn delete_product(&self, id: ProductId) -> Result<Option<Product>, Error>;
}

#[derive(Clone)]
pub(crate) struct Stores {
    pub(crate) users: Arc<dyn UserStore>,
    pub(crate) products: Arc<dyn ProductStore>,
}

impl Stores {
    pub(crate) fn memory() -> Self {
        let store = Arc::new(memory::MemoryStore::new());

        Self {
            users: store.clone(),
            products: store,
        }
    }

    pub(crate) async fn connect(args: &Args) -> Result<Self, ConfigError> {
        match args.store {
            StoreKind::Memory => {
                tracing::warn!("using the in-memory store, data will not survive a restart");
                Ok(Self::memory())
            }
            StoreKind::Postgres => {
                let store = Arc::new(
                    postgres::PgStore::connect(
                        &args.database_url(),
                        args.database_max_connections,
                    )
                    .await?,
                );

                store.migrate().await?;

                Ok(Self {
                    users: store.clone(),
                    products: store,
                })
            }
        }
    }
}
