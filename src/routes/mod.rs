pub(crate) mod admin;
pub(crate) mod auth;
pub(crate) mod product;
pub(crate) mod router;
pub(crate) mod upload;
pub(crate) mod user;
