pub(crate) mod product;
pub(crate) mod upload;
pub(crate) mod user;
