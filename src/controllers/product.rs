use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::controllers::upload::{Folder, UploadController};
use crate::core::error::{ALLOWED_UPDATES, Error};
use crate::store::{ProductStore, UserStore};
use crate::types::product::{
    Category, NewProduct, Page, Product, ProductChanges, ProductFilter, ProductId, Status,
};
use crate::types::request::{
    DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, MyProductsQuery, NewProductData, Price,
};
use crate::types::response::{Deleted, Owner, ProductPage, ProductSummary, ProductView};
use crate::types::user::{Session, UserId};
use crate::utils::ownership::ensure_owner_or_admin;

const TITLE_MAX: usize = 50;
const DESCRIPTION_MAX: usize = 500;

#[derive(Clone)]
pub(crate) struct ProductController {
    products: Arc<dyn ProductStore>,
    users: Arc<dyn UserStore>,
    uploads: UploadController,
}

impl std::fmt::Debug for ProductController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProductController")
            .field("uploads", &self.uploads)
            .finish_non_exhaustive()
    }
}

impl ProductController {
    pub(crate) fn new(
        products: Arc<dyn ProductStore>,
        users: Arc<dyn UserStore>,
        uploads: UploadController,
    ) -> Self {
        Self {
            products,
            users,
            uploads,
        }
    }

    pub(crate) async fn create(
        &self,
        session: &Session,
        data: NewProductData,
    ) -> Result<Product, Error> {
        let product = validate_new(data)?;

        // listings may only point at product images this service stored
        if !product
            .images
            .iter()
            .all(|image| self.uploads.is_stored(Folder::Products, image))
        {
            return Err(Error::Validation(
                "Images must be uploaded through /upload".into(),
            ));
        }

        let product = self.products.insert_product(session.user_id, product).await?;

        tracing::info!(product_id = product.id, owner = product.owner, "product created");

        Ok(product)
    }

    pub(crate) async fn list(&self, filter: &ProductFilter) -> Result<Vec<ProductView>, Error> {
        let products = self.products.list_products(filter).await?;

        self.populate(products).await
    }

    pub(crate) async fn mine(
        &self,
        session: &Session,
        query: &MyProductsQuery,
    ) -> Result<ProductPage, Error> {
        let page = page_of(query)?;

        let (products, total) = self
            .products
            .page_products(&query.filter(session.user_id), page)
            .await?;

        Ok(ProductPage {
            products: self.populate(products).await?,
            total,
        })
    }

    pub(crate) async fn get(&self, id: ProductId) -> Result<ProductView, Error> {
        let product = self
            .products
            .find_product(id)
            .await?
            .ok_or(Error::ProductNotFound)?;

        let owner = self.users.find_by_id(product.owner).await?;

        Ok(ProductView::new(product, owner.as_ref().map(Owner::from)))
    }

    /// Applies a partial update. Only the fields in [`ALLOWED_UPDATES`] may
    /// appear in the body; anything else rejects the whole request.
    pub(crate) async fn update(
        &self,
        session: &Session,
        id: ProductId,
        fields: Map<String, Value>,
    ) -> Result<ProductSummary, Error> {
        let changes = parse_changes(fields)?;

        let product = self
            .products
            .find_product(id)
            .await?
            .ok_or(Error::ProductNotFound)?;

        ensure_owner_or_admin(session, &product, self.users.as_ref()).await?;

        let product = self
            .products
            .update_product(id, changes)
            .await?
            .ok_or(Error::ProductNotFound)?;

        tracing::info!(product_id = id, user_id = session.user_id, "product updated");

        Ok(ProductSummary::from(&product))
    }

    pub(crate) async fn delete(&self, session: &Session, id: ProductId) -> Result<Deleted, Error> {
        let product = self
            .products
            .find_product(id)
            .await?
            .ok_or(Error::ProductNotFound)?;

        ensure_owner_or_admin(session, &product, self.users.as_ref()).await?;

        let product = self
            .products
            .delete_product(id)
            .await?
            .ok_or(Error::ProductNotFound)?;

        self.discard_images(&product.images).await?;

        tracing::info!(product_id = id, user_id = session.user_id, "product deleted");

        Ok(Deleted { deleted_id: id })
    }

    /// Removes the stored product images in `images` that no remaining
    /// listing still refers to.
    async fn discard_images(&self, images: &[String]) -> Result<(), Error> {
        let stored: BTreeSet<&String> = images
            .iter()
            .filter(|image| self.uploads.is_stored(Folder::Products, image))
            .collect();

        if stored.is_empty() {
            return Ok(());
        }

        let remaining = self.products.list_products(&ProductFilter::default()).await?;
        let referenced: BTreeSet<&String> = remaining
            .iter()
            .flat_map(|product| product.images.iter())
            .collect();

        for image in stored.difference(&referenced) {
            self.uploads.discard(image).await;
        }

        Ok(())
    }

    async fn populate(&self, products: Vec<Product>) -> Result<Vec<ProductView>, Error> {
        let mut owners: BTreeMap<UserId, Option<Owner>> = BTreeMap::new();

        for product in &products {
            if !owners.contains_key(&product.owner) {
                let owner = self.users.find_by_id(product.owner).await?;
                owners.insert(product.owner, owner.as_ref().map(Owner::from));
            }
        }

        Ok(products
            .into_iter()
            .map(|product| {
                let owner = owners.get(&product.owner).cloned().flatten();
                ProductView::new(product, owner)
            })
            .collect())
    }
}

fn validate_new(data: NewProductData) -> Result<NewProduct, Error> {
    let NewProductData {
        title: Some(title),
        description: Some(description),
        price: Some(price),
        category: Some(category),
        contact: Some(contact),
        images: Some(images),
    } = data
    else {
        return Err(Error::Validation("Missing required fields".into()));
    };

    Ok(NewProduct {
        title: title_of(&title)?,
        description: description_of(&description)?,
        price: price_of(&price)?,
        category: category_of(&category)?,
        contact: contact_of(&contact)?,
        images: images.into_vec(),
    })
}

fn page_of(query: &MyProductsQuery) -> Result<Page, Error> {
    let page = query.page.unwrap_or(1);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);

    if page == 0 {
        return Err(Error::Validation("page must be at least 1".into()));
    }

    if !(1..=MAX_PAGE_SIZE).contains(&limit) {
        return Err(Error::Validation(format!(
            "limit must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }

    Ok(Page {
        offset: (page - 1).saturating_mul(limit),
        limit,
    })
}

fn parse_changes(fields: Map<String, Value>) -> Result<ProductChanges, Error> {
    if fields
        .keys()
        .any(|key| !ALLOWED_UPDATES.contains(&key.as_str()))
    {
        return Err(Error::InvalidUpdateFields);
    }

    let mut changes = ProductChanges::default();

    for (key, value) in fields {
        match key.as_str() {
            "title" => changes.title = Some(title_of(string_field(&key, &value)?)?),
            "description" => {
                changes.description = Some(description_of(string_field(&key, &value)?)?)
            }
            "price" => {
                let price = serde_json::from_value::<Price>(value)
                    .map_err(|_| Error::Validation("Price must be a valid number".into()))?;
                changes.price = Some(price_of(&price)?);
            }
            "category" => changes.category = Some(category_of(string_field(&key, &value)?)?),
            "contact" => changes.contact = Some(contact_of(string_field(&key, &value)?)?),
            "status" => {
                let status = string_field(&key, &value)?;
                changes.status = Some(
                    status
                        .parse::<Status>()
                        .map_err(|_| Error::Validation(format!("Unknown status: {status}")))?,
                );
            }
            _ => return Err(Error::InvalidUpdateFields),
        }
    }

    Ok(changes)
}

fn string_field<'a>(key: &str, value: &'a Value) -> Result<&'a str, Error> {
    value
        .as_str()
        .ok_or_else(|| Error::Validation(format!("{key} must be a string")))
}

fn title_of(title: &str) -> Result<String, Error> {
    let title = title.trim();

    if title.is_empty() || title.chars().count() > TITLE_MAX {
        return Err(Error::Validation(
            "Title must be between 1 and 50 characters".into(),
        ));
    }

    Ok(title.into())
}

fn description_of(description: &str) -> Result<String, Error> {
    let description = description.trim();

    if description.is_empty() || description.chars().count() > DESCRIPTION_MAX {
        return Err(Error::Validation(
            "Description must be between 1 and 500 characters".into(),
        ));
    }

    Ok(description.into())
}

fn price_of(price: &Price) -> Result<f64, Error> {
    match price.value() {
        Some(value) if value >= 0.0 => Ok(value),
        _ => Err(Error::Validation("Price must be a valid number".into())),
    }
}

fn category_of(category: &str) -> Result<Category, Error> {
    category
        .parse()
        .map_err(|_| Error::Validation(format!("Unknown category: {category}")))
}

fn contact_of(contact: &str) -> Result<String, Error> {
    let contact = contact.trim();

    if contact.is_empty() {
        return Err(Error::Validation("Contact information is required".into()));
    }

    Ok(contact.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::types::request::Images;
    use crate::types::user::{NewUser, Role};
    use serde_json::json;

    struct Fixture {
        controller: ProductController,
        store: Arc<MemoryStore>,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let controller = ProductController::new(
            store.clone(),
            store.clone(),
            UploadController::new(dir.path().to_path_buf()),
        );

        Fixture {
            controller,
            store,
            _dir: dir,
        }
    }

    async fn session(store: &MemoryStore, username: &str, role: Role) -> Session {
        let user = store
            .insert_user(NewUser {
                username: username.into(),
                password_hash: "hash".into(),
                email: format!("{username}@campus.edu"),
                role,
            })
            .await
            .unwrap();

        Session { user_id: user.id }
    }

    fn listing() -> NewProductData {
        NewProductData {
            title: Some("  Calculus textbook ".into()),
            description: Some("Some highlighting".into()),
            price: Some(Price::Text("35.5".into())),
            category: Some("物品/教材".into()),
            contact: Some("qq 123456".into()),
            images: Some(Images::One("/uploads/products/book.png".into())),
        }
    }

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn create_assigns_owner_and_normalizes_fields() {
        let f = fixture();
        let alice = session(&f.store, "alice", Role::User).await;

        let product = f.controller.create(&alice, listing()).await.unwrap();

        assert_eq!(product.owner, alice.user_id);
        assert_eq!(product.title, "Calculus textbook");
        assert_eq!(product.price, 35.5);
        assert_eq!(product.category, Category::Textbooks);
        assert_eq!(product.status, Status::Available);
        assert_eq!(product.images, ["/uploads/products/book.png"]);
    }

    #[tokio::test]
    async fn create_rejects_missing_and_invalid_fields() {
        let f = fixture();
        let alice = session(&f.store, "alice", Role::User).await;

        let mut missing = listing();
        missing.contact = None;
        assert!(matches!(
            f.controller.create(&alice, missing).await,
            Err(Error::Validation(_))
        ));

        let mut negative = listing();
        negative.price = Some(Price::Number(-1.0));
        assert!(f.controller.create(&alice, negative).await.is_err());

        let mut long_title = listing();
        long_title.title = Some("x".repeat(51));
        assert!(f.controller.create(&alice, long_title).await.is_err());

        let mut category = listing();
        category.category = Some("furniture".into());
        assert!(f.controller.create(&alice, category).await.is_err());

        assert!(f.controller.list(&ProductFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_rejects_unknown_fields() {
        let f = fixture();
        let alice = session(&f.store, "alice", Role::User).await;
        let product = f.controller.create(&alice, listing()).await.unwrap();

        assert!(matches!(
            f.controller
                .update(&alice, product.id, fields(json!({"owner": 99})))
                .await,
            Err(Error::InvalidUpdateFields)
        ));
        assert!(matches!(
            f.controller
                .update(&alice, product.id, fields(json!({"price": "free"})))
                .await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn owner_can_update() {
        let f = fixture();
        let alice = session(&f.store, "alice", Role::User).await;
        let product = f.controller.create(&alice, listing()).await.unwrap();

        let summary = f
            .controller
            .update(&alice, product.id, fields(json!({"price": 20, "status": "sold"})))
            .await
            .unwrap();

        assert_eq!(summary.price, 20.0);
        assert_eq!(summary.status, Status::Sold);
        assert_eq!(summary.title, "Calculus textbook");
    }

    #[tokio::test]
    async fn stranger_cannot_update_or_delete() {
        let f = fixture();
        let alice = session(&f.store, "alice", Role::User).await;
        let bob = session(&f.store, "bob", Role::User).await;
        let product = f.controller.create(&alice, listing()).await.unwrap();

        assert!(matches!(
            f.controller
                .update(&bob, product.id, fields(json!({"price": 1})))
                .await,
            Err(Error::Forbidden)
        ));
        assert!(matches!(
            f.controller.delete(&bob, product.id).await,
            Err(Error::Forbidden)
        ));

        let unchanged = f.controller.get(product.id).await.unwrap();
        assert_eq!(unchanged.price, 35.5);
    }

    #[tokio::test]
    async fn admin_can_delete_any_product() {
        let f = fixture();
        let alice = session(&f.store, "alice", Role::User).await;
        let root = session(&f.store, "root", Role::Admin).await;
        let product = f.controller.create(&alice, listing()).await.unwrap();

        let deleted = f.controller.delete(&root, product.id).await.unwrap();

        assert_eq!(deleted.deleted_id, product.id);
        assert!(matches!(
            f.controller.get(product.id).await,
            Err(Error::ProductNotFound)
        ));
    }

    #[tokio::test]
    async fn missing_product_is_not_found() {
        let f = fixture();
        let alice = session(&f.store, "alice", Role::User).await;

        assert!(matches!(
            f.controller.delete(&alice, 404).await,
            Err(Error::ProductNotFound)
        ));
        assert!(matches!(
            f.controller
                .update(&alice, 404, fields(json!({"title": "x"})))
                .await,
            Err(Error::ProductNotFound)
        ));
    }

    #[tokio::test]
    async fn views_populate_owner() {
        let f = fixture();
        let alice = session(&f.store, "alice", Role::User).await;
        let bob = session(&f.store, "bob", Role::User).await;
        f.controller.create(&alice, listing()).await.unwrap();
        f.controller.create(&bob, listing()).await.unwrap();

        let all = f.controller.list(&ProductFilter::default()).await.unwrap();
        let owners: Vec<&str> = all
            .iter()
            .filter_map(|view| view.owner.as_ref().map(|owner| owner.username.as_str()))
            .collect();
        assert_eq!(owners, ["bob", "alice"]);

        let mine = f
            .controller
            .mine(&alice, &MyProductsQuery::default())
            .await
            .unwrap();
        assert_eq!(mine.products.len(), 1);
        assert_eq!(mine.total, 1);
    }

    #[tokio::test]
    async fn mine_is_paged_and_filtered() {
        let f = fixture();
        let alice = session(&f.store, "alice", Role::User).await;

        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(f.controller.create(&alice, listing()).await.unwrap().id);
        }
        f.controller
            .update(&alice, ids[0], fields(json!({"status": "sold"})))
            .await
            .unwrap();

        let query = MyProductsQuery {
            page: Some(2),
            limit: Some(2),
            ..MyProductsQuery::default()
        };
        let second = f.controller.mine(&alice, &query).await.unwrap();
        assert_eq!(second.total, 3);
        assert_eq!(second.products.len(), 1);
        assert_eq!(second.products[0].id, ids[0]);

        let query = MyProductsQuery {
            status: Some(Status::Available),
            ..MyProductsQuery::default()
        };
        let available = f.controller.mine(&alice, &query).await.unwrap();
        assert_eq!(available.total, 2);

        for query in [
            MyProductsQuery {
                page: Some(0),
                ..MyProductsQuery::default()
            },
            MyProductsQuery {
                limit: Some(0),
                ..MyProductsQuery::default()
            },
            MyProductsQuery {
                limit: Some(MAX_PAGE_SIZE + 1),
                ..MyProductsQuery::default()
            },
        ] {
            assert!(matches!(
                f.controller.mine(&alice, &query).await,
                Err(Error::Validation(_))
            ));
        }
    }

    #[tokio::test]
    async fn create_only_accepts_stored_product_images() {
        let f = fixture();
        let alice = session(&f.store, "alice", Role::User).await;

        for image in [
            "/uploads/avatars/bob.png",
            "/uploads/products/../avatars/bob.png",
            "https://elsewhere.test/a.png",
        ] {
            let mut data = listing();
            data.images = Some(Images::One(image.into()));
            assert!(matches!(
                f.controller.create(&alice, data).await,
                Err(Error::Validation(_))
            ));
        }
    }

    #[tokio::test]
    async fn delete_keeps_images_other_listings_use() {
        let f = fixture();
        let alice = session(&f.store, "alice", Role::User).await;
        let bob = session(&f.store, "bob", Role::User).await;

        let image = f.controller.uploads.root().join("products/book.png");
        tokio::fs::create_dir_all(image.parent().unwrap()).await.unwrap();
        tokio::fs::write(&image, b"png").await.unwrap();

        let original = f.controller.create(&alice, listing()).await.unwrap();
        let copy = f.controller.create(&bob, listing()).await.unwrap();

        f.controller.delete(&bob, copy.id).await.unwrap();
        assert!(image.exists());

        f.controller.delete(&alice, original.id).await.unwrap();
        assert!(!image.exists());
    }
}
