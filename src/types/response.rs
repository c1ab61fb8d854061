use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::product::{Category, Product, ProductId, Status};
use crate::types::user::{Role, User, UserId};

/// Success envelope: `{ code, message?, data?, count?, total? }` where `code`
/// mirrors the HTTP status.
#[derive(Debug)]
pub(crate) struct ApiResponse<T: Serialize> {
    status: StatusCode,
    message: Option<String>,
    data: Option<T>,
    count: Option<usize>,
    total: Option<usize>,
}

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    total: Option<usize>,
}

impl<T: Serialize> ApiResponse<T> {
    pub(crate) fn ok(data: T) -> Self {
        Self {
            status: StatusCode::OK,
            message: None,
            data: Some(data),
            count: None,
            total: None,
        }
    }

    pub(crate) fn created(data: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            ..Self::ok(data)
        }
    }

    pub(crate) fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub(crate) fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    pub(crate) fn with_total(mut self, total: usize) -> Self {
        self.total = Some(total);
        self
    }
}

impl ApiResponse<()> {
    pub(crate) fn message(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            message: Some(message.into()),
            data: None,
            count: None,
            total: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let envelope = Envelope {
            code: self.status.as_u16(),
            message: self.message.as_deref(),
            data: self.data.as_ref(),
            count: self.count,
            total: self.total,
        };

        (self.status, Json(envelope)).into_response()
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoginUser {
    pub(crate) id: UserId,
    pub(crate) username: String,
    pub(crate) email: String,
    pub(crate) avatar: String,
    pub(crate) nickname: String,
    pub(crate) created_at: DateTime<Utc>,
}

impl From<&User> for LoginUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            avatar: user.avatar.clone(),
            nickname: user.nickname.clone(),
            created_at: user.created_at,
        }
    }
}

#[derive(Serialize, Debug)]
pub(crate) struct Login {
    pub(crate) token: String,
    pub(crate) user: LoginUser,
}

impl Login {
    pub(crate) fn new(user: &User, token: String) -> Self {
        Self {
            token,
            user: LoginUser::from(user),
        }
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Profile {
    pub(crate) id: UserId,
    pub(crate) username: String,
    pub(crate) email: String,
    pub(crate) nickname: String,
    pub(crate) avatar: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) avatar_url: Option<String>,
    pub(crate) qq: String,
    pub(crate) role: Role,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

impl Profile {
    pub(crate) fn new(user: &User, file_base_url: &str) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            nickname: user.nickname.clone(),
            avatar: user.avatar.clone(),
            avatar_url: (!user.avatar.is_empty())
                .then(|| format!("{}{}", file_base_url, user.avatar)),
            qq: user.qq.clone(),
            role: user.role,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Avatar {
    pub(crate) avatar_url: String,
}

#[derive(Serialize, Debug)]
pub(crate) struct Upload {
    pub(crate) url: String,
}

#[derive(Serialize, Debug, Clone)]
pub(crate) struct Owner {
    pub(crate) id: UserId,
    pub(crate) username: String,
    pub(crate) avatar: String,
}

impl From<&User> for Owner {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            avatar: user.avatar.clone(),
        }
    }
}

/// One page of listings plus how many match overall.
#[derive(Debug)]
pub(crate) struct ProductPage {
    pub(crate) products: Vec<ProductView>,
    pub(crate) total: usize,
}

/// A listing with its owner populated. `owner` is null when the owning
/// account no longer resolves.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProductView {
    pub(crate) id: ProductId,
    pub(crate) owner: Option<Owner>,
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) price: f64,
    pub(crate) category: Category,
    pub(crate) images: Vec<String>,
    pub(crate) contact: String,
    pub(crate) status: Status,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

impl ProductView {
    pub(crate) fn new(product: Product, owner: Option<Owner>) -> Self {
        Self {
            id: product.id,
            owner,
            title: product.title,
            description: product.description,
            price: product.price,
            category: product.category,
            images: product.images,
            contact: product.contact,
            status: product.status,
            created_at: product.created_at,
            updated_at: product.updated_at,
        }
    }
}

#[derive(Serialize, Debug)]
pub(crate) struct ProductSummary {
    pub(crate) id: ProductId,
    pub(crate) title: String,
    pub(crate) price: f64,
    pub(crate) status: Status,
}

impl From<&Product> for ProductSummary {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id,
            title: product.title.clone(),
            price: product.price,
            status: product.status,
        }
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Deleted {
    pub(crate) deleted_id: ProductId,
}
