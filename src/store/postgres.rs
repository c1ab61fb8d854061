use async_trait::async_trait;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};

use crate::core::error::{ConfigError, Error};
use crate::store::{ProductStore, UserStore};
use crate::types::product::{
    NewProduct, Page, Product, ProductChanges, ProductFilter, ProductId,
};
use crate::types::user::{NewUser, ProfileChanges, User, UserId};

const USER_COLUMNS: &str = "id, username, password_hash, email, nickname, avatar, qq, role, created_at, updated_at";

const PRODUCT_FILTER: &str = "($1::INTEGER IS NULL OR owner_id = $1)
    AND ($2::TEXT IS NULL OR status = $2)
    AND ($3::TEXT IS NULL OR category = $3)";

const PRODUCT_COLUMNS: &str = "id, owner_id, title, description, price, category, images, contact, status, created_at, updated_at";

#[derive(Clone, Debug)]
pub(crate) struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub(crate) async fn connect(
        database_url: &str,
        max_connections: u32,
    ) -> Result<Self, ConfigError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub(crate) async fn migrate(&self) -> Result<(), ConfigError> {
        sqlx::migrate!().run(&self.pool).await?;

        Ok(())
    }

    async fn fetch_user(&self, column: &str, value: &str) -> Result<Option<User>, Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = $1");

        Ok(sqlx::query(&query)
            .bind(value)
            .try_map(map_user)
            .fetch_optional(&self.pool)
            .await?)
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn insert_user(&self, user: NewUser) -> Result<User, Error> {
        let query = format!(
            "INSERT INTO users (username, password_hash, email, role) VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS};"
        );

        sqlx::query(&query)
            .bind(&user.username)
            .bind(&user.password_hash)
            .bind(&user.email)
            .bind(user.role.as_str())
            .try_map(map_user)
            .fetch_one(&self.pool)
            .await
            .map_err(map_unique_violation)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");

        Ok(sqlx::query(&query)
            .bind(id)
            .try_map(map_user)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, Error> {
        self.fetch_user("username", username).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        self.fetch_user("email", email).await
    }

    async fn update_profile(
        &self,
        id: UserId,
        changes: ProfileChanges,
    ) -> Result<Option<User>, Error> {
        let query = format!(
            "UPDATE users SET
                nickname = COALESCE($2, nickname),
                qq = COALESCE($3, qq),
                email = COALESCE($4, email),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS};"
        );

        sqlx::query(&query)
            .bind(id)
            .bind(changes.nickname)
            .bind(changes.qq)
            .bind(changes.email)
            .try_map(map_user)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_unique_violation)
    }

    async fn set_password_hash(&self, id: UserId, password_hash: &str) -> Result<bool, Error> {
        let result =
            sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1;")
                .bind(id)
                .bind(password_hash)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_avatar(&self, id: UserId, avatar: &str) -> Result<bool, Error> {
        let result =
            sqlx::query("UPDATE users SET avatar = $2, updated_at = NOW() WHERE id = $1;")
                .bind(id)
                .bind(avatar)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl ProductStore for PgStore {
    async fn insert_product(&self, owner: UserId, product: NewProduct) -> Result<Product, Error> {
        let query = format!(
            "INSERT INTO products (owner_id, title, description, price, category, images, contact)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {PRODUCT_COLUMNS};"
        );

        Ok(sqlx::query(&query)
            .bind(owner)
            .bind(&product.title)
            .bind(&product.description)
            .bind(product.price)
            .bind(product.category.label())
            .bind(&product.images)
            .bind(&product.contact)
            .try_map(map_product)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn find_product(&self, id: ProductId) -> Result<Option<Product>, Error> {
        let query = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");

        Ok(sqlx::query(&query)
            .bind(id)
            .try_map(map_product)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, Error> {
        let query = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products
            WHERE {PRODUCT_FILTER}
            ORDER BY created_at DESC, id DESC;"
        );

        Ok(sqlx::query(&query)
            .bind(filter.owner)
            .bind(filter.status.map(|status| status.as_str()))
            .bind(filter.category.map(|category| category.label()))
            .try_map(map_product)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn page_products(
        &self,
        filter: &ProductFilter,
        page: Page,
    ) -> Result<(Vec<Product>, usize), Error> {
        let query = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products
            WHERE {PRODUCT_FILTER}
            ORDER BY created_at DESC, id DESC
            LIMIT $4 OFFSET $5;"
        );

        let products = sqlx::query(&query)
            .bind(filter.owner)
            .bind(filter.status.map(|status| status.as_str()))
            .bind(filter.category.map(|category| category.label()))
            .bind(i64::try_from(page.limit).unwrap_or(i64::MAX))
            .bind(i64::try_from(page.offset).unwrap_or(i64::MAX))
            .try_map(map_product)
            .fetch_all(&self.pool)
            .await?;

        let total: i64 = sqlx::query(&format!(
            "SELECT COUNT(*) AS total FROM products WHERE {PRODUCT_FILTER};"
        ))
        .bind(filter.owner)
        .bind(filter.status.map(|status| status.as_str()))
        .bind(filter.category.map(|category| category.label()))
        .try_map(|row: PgRow| row.try_get("total"))
        .fetch_one(&self.pool)
        .await?;

        Ok((products, usize::try_from(total).unwrap_or_default()))
    }

    async fn update_product(
        &self,
        id: ProductId,
        changes: ProductChanges,
    ) -> Result<Option<Product>, Error> {
        let query = format!(
            "UPDATE products SET
                title = COALESCE($2, title),
                description = COALESCE($3, description),
                price = COALESCE($4, price),
                category = COALESCE($5, category),
                contact = COALESCE($6, contact),
                status = COALESCE($7, status),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS};"
        );

        Ok(sqlx::query(&query)
            .bind(id)
            .bind(changes.title)
            .bind(changes.description)
            .bind(changes.price)
            .bind(changes.category.map(|category| category.label()))
            .bind(changes.contact)
            .bind(changes.status.map(|status| status.as_str()))
            .try_map(map_product)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_product(&self, id: ProductId) -> Result<Option<Product>, Error> {
        let query = format!("DELETE FROM products WHERE id = $1 RETURNING {PRODUCT_COLUMNS};");

        Ok(sqlx::query(&query)
            .bind(id)
            .try_map(map_product)
            .fetch_optional(&self.pool)
            .await?)
    }
}

fn map_unique_violation(e: sqlx::Error) -> Error {
    match e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            match db_err.constraint() {
                Some("users_username_key") => Error::UsernameTaken,
                _ => Error::EmailTaken,
            }
        }
        e => Error::Sql(e),
    }
}

fn decode_error(e: String) -> sqlx::Error {
    sqlx::Error::Decode(e.into())
}

fn map_user(row: PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        password_hash: row.try_get("password_hash")?,
        email: row.try_get("email")?,
        nickname: row.try_get("nickname")?,
        avatar: row.try_get("avatar")?,
        qq: row.try_get("qq")?,
        role: row
            .try_get::<String, _>("role")?
            .parse()
            .map_err(decode_error)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_product(row: PgRow) -> Result<Product, sqlx::Error> {
    Ok(Product {
        id: row.try_get("id")?,
        owner: row.try_get("owner_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        price: row.try_get("price")?,
        category: row
            .try_get::<String, _>("category")?
            .parse()
            .map_err(decode_error)?,
        images: row.try_get("images")?,
        contact: row.try_get("contact")?,
        status: row
            .try_get::<String, _>("status")?
            .parse()
            .map_err(decode_error)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
