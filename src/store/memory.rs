use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::core::error::Error;
use crate::store::{ProductStore, UserStore};
use crate::types::product::{
    NewProduct, Page, Product, ProductChanges, ProductFilter, ProductId,
};
use crate::types::user::{DEFAULT_NICKNAME, NewUser, ProfileChanges, User, UserId};

#[derive(Default)]
struct Tables {
    users: BTreeMap<UserId, User>,
    products: BTreeMap<ProductId, Product>,
    next_user_id: UserId,
    next_product_id: ProductId,
}

/// In-process store. Each operation holds the lock for its whole
/// read-modify-write, which gives the same single-record atomicity the
/// database provides.
#[derive(Default)]
pub(crate) struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: NewUser) -> Result<User, Error> {
        let mut tables = self.tables.write().await;

        if tables.users.values().any(|u| u.username == user.username) {
            return Err(Error::UsernameTaken);
        }
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(Error::EmailTaken);
        }

        tables.next_user_id += 1;
        let now = Utc::now();
        let user = User {
            id: tables.next_user_id,
            username: user.username,
            password_hash: user.password_hash,
            email: user.email,
            nickname: DEFAULT_NICKNAME.into(),
            avatar: String::new(),
            qq: String::new(),
            role: user.role,
            created_at: now,
            updated_at: now,
        };

        tables.users.insert(user.id, user.clone());

        Ok(user)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, Error> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, Error> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.username == username).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn update_profile(
        &self,
        id: UserId,
        changes: ProfileChanges,
    ) -> Result<Option<User>, Error> {
        let mut tables = self.tables.write().await;

        if let Some(email) = &changes.email {
            if tables.users.values().any(|u| u.id != id && &u.email == email) {
                return Err(Error::EmailTaken);
            }
        }

        let Some(user) = tables.users.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(nickname) = changes.nickname {
            user.nickname = nickname;
        }
        if let Some(qq) = changes.qq {
            user.qq = qq;
        }
        if let Some(email) = changes.email {
            user.email = email;
        }
        user.updated_at = Utc::now();

        Ok(Some(user.clone()))
    }

    async fn set_password_hash(&self, id: UserId, password_hash: &str) -> Result<bool, Error> {
        let mut tables = self.tables.write().await;

        Ok(match tables.users.get_mut(&id) {
            Some(user) => {
                user.password_hash = password_hash.into();
                user.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn set_avatar(&self, id: UserId, avatar: &str) -> Result<bool, Error> {
        let mut tables = self.tables.write().await;

        Ok(match tables.users.get_mut(&id) {
            Some(user) => {
                user.avatar = avatar.into();
                user.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn insert_product(&self, owner: UserId, product: NewProduct) -> Result<Product, Error> {
        let mut tables = self.tables.write().await;

        tables.next_product_id += 1;
        let now = Utc::now();
        let product = Product {
            id: tables.next_product_id,
            owner,
            title: product.title,
            description: product.description,
            price: product.price,
            category: product.category,
            images: product.images,
            contact: product.contact,
            status: Default::default(),
            created_at: now,
            updated_at: now,
        };

        tables.products.insert(product.id, product.clone());

        Ok(product)
    }

    async fn find_product(&self, id: ProductId) -> Result<Option<Product>, Error> {
        Ok(self.tables.read().await.products.get(&id).cloned())
    }

    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, Error> {
        let tables = self.tables.read().await;

        // ids are handed out in insertion order, so reverse id order breaks
        // created_at ties the same way
        Ok(tables
            .products
            .values()
            .rev()
            .filter(|product| filter.matches(product))
            .cloned()
            .collect())
    }

    async fn page_products(
        &self,
        filter: &ProductFilter,
        page: Page,
    ) -> Result<(Vec<Product>, usize), Error> {
        let tables = self.tables.read().await;

        let matching: Vec<&Product> = tables
            .products
            .values()
            .rev()
            .filter(|product| filter.matches(product))
            .collect();
        let total = matching.len();

        let products = matching
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .cloned()
            .collect();

        Ok((products, total))
    }

    async fn update_product(
        &self,
        id: ProductId,
        changes: ProductChanges,
    ) -> Result<Option<Product>, Error> {
        let mut tables = self.tables.write().await;

        let Some(product) = tables.products.get_mut(&id) else {
            return Ok(None);
        };

        changes.apply(product);
        product.updated_at = Utc::now();

        Ok(Some(product.clone()))
    }

    async fn delete_product(&self, id: ProductId) -> Result<Option<Product>, Error> {
        Ok(self.tables.write().await.products.remove(&id))
    }
}
