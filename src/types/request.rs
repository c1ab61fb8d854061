use serde::Deserialize;

use crate::types::product::{Category, ProductFilter, Status};
use crate::types::user::UserId;

pub(crate) const DEFAULT_PAGE_SIZE: usize = 10;
pub(crate) const MAX_PAGE_SIZE: usize = 100;

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub(crate) struct RegisterData {
    pub(crate) username: String,
    pub(crate) password: String,
    pub(crate) email: String,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub(crate) struct LoginData {
    pub(crate) username: String,
    pub(crate) password: String,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct UpdatePasswordData {
    pub(crate) current_password: String,
    pub(crate) new_password: String,
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct ProfileData {
    pub(crate) nickname: Option<String>,
    pub(crate) qq: Option<String>,
    pub(crate) email: Option<String>,
}

/// Form clients send prices either as JSON numbers or as numeric strings.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub(crate) enum Price {
    Number(f64),
    Text(String),
}

impl Price {
    pub(crate) fn value(&self) -> Option<f64> {
        let value = match self {
            Price::Number(n) => *n,
            Price::Text(s) => s.trim().parse().ok()?,
        };
        value.is_finite().then_some(value)
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub(crate) enum Images {
    One(String),
    Many(Vec<String>),
}

impl Images {
    pub(crate) fn into_vec(self) -> Vec<String> {
        match self {
            Images::One(image) => vec![image],
            Images::Many(images) => images,
        }
    }
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct NewProductData {
    pub(crate) title: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) price: Option<Price>,
    pub(crate) category: Option<String>,
    pub(crate) contact: Option<String>,
    pub(crate) images: Option<Images>,
}

/// Query string of `GET /products/my`. Pages are 1-based.
#[derive(Deserialize, Debug, Default)]
pub(crate) struct MyProductsQuery {
    pub(crate) status: Option<Status>,
    pub(crate) category: Option<Category>,
    pub(crate) page: Option<usize>,
    pub(crate) limit: Option<usize>,
}

impl MyProductsQuery {
    pub(crate) fn filter(&self, owner: UserId) -> ProductFilter {
        ProductFilter {
            status: self.status,
            category: self.category,
            ..ProductFilter::owned_by(owner)
        }
    }
}
