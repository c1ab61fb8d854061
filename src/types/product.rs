use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::types::user::UserId;

pub(crate) type ProductId = i32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Category {
    Textbooks,
    Electronics,
    SportsGear,
    DormSupplies,
    Tutoring,
    Rentals,
    PartTimeJobs,
    NoteCopying,
    ClassStandIn,
    WritingHelp,
    ParcelPickup,
    CourseGrinding,
    LostCampusCard,
    LostOther,
    EBooks,
    ExamMaterials,
}

impl Category {
    pub(crate) const ALL: [Category; 16] = [
        Category::Textbooks,
        Category::Electronics,
        Category::SportsGear,
        Category::DormSupplies,
        Category::Tutoring,
        Category::Rentals,
        Category::PartTimeJobs,
        Category::NoteCopying,
        Category::ClassStandIn,
        Category::WritingHelp,
        Category::ParcelPickup,
        Category::CourseGrinding,
        Category::LostCampusCard,
        Category::LostOther,
        Category::EBooks,
        Category::ExamMaterials,
    ];

    pub(crate) fn label(&self) -> &'static str {
        match self {
            Category::Textbooks => "物品/教材",
            Category::Electronics => "物品/电子外设",
            Category::SportsGear => "物品/运动器材",
            Category::DormSupplies => "物品/宿舍用品",
            Category::Tutoring => "信息/家教",
            Category::Rentals => "信息/租房",
            Category::PartTimeJobs => "信息/兼职",
            Category::NoteCopying => "代替/代抄",
            Category::ClassStandIn => "代替/代课",
            Category::WritingHelp => "代替/代写",
            Category::ParcelPickup => "代替/快递代取",
            Category::CourseGrinding => "代替/刷课",
            Category::LostCampusCard => "失物/校园卡",
            Category::LostOther => "失物/其他",
            Category::EBooks => "宝藏/电子教材",
            Category::ExamMaterials => "宝藏/考试资料",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|category| category.label() == s)
            .ok_or_else(|| format!("unknown category: {s}"))
    }
}

// Categories travel as their display labels on the wire and in the database.
impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        label.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Status {
    #[default]
    Available,
    Sold,
    Removed,
}

impl Status {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Status::Available => "available",
            Status::Sold => "sold",
            Status::Removed => "removed",
        }
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(Status::Available),
            "sold" => Ok(Status::Sold),
            "removed" => Ok(Status::Removed),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Product {
    pub(crate) id: ProductId,
    pub(crate) owner: UserId,
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

/// A validated listing ready to persist.
#[derive(Clone, Debug)]
pub(crate) struct NewProduct {
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) price: f64,
    pub(crate) category: Category,
    pub(crate) images: Vec<String>,
    pub(crate) contact: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct ProductChanges {
    pub(crate) title: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) price: Option<f64>,
    pub(crate) category: Option<Category>,
    pub(crate) contact: Option<String>,
    pub(crate) status: Option<Status>,
}

impl ProductChanges {
    pub(crate) fn apply(self, product: &mut Product) {
        if let Some(title) = self.title {
            product.title = title;
        }
        if let Some(description) = self.description {
            product.description = description;
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        if let Some(category) = self.category {
            product.category = category;
        }
        if let Some(contact) = self.contact {
            product.contact = contact;
        }
        if let Some(status) = self.status {
            product.status = status;
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub(crate) struct ProductFilter {
    #[serde(skip)]
    pub(crate) owner: Option<UserId>,
    pub(crate) status: Option<Status>,
    pub(crate) category: Option<Category>,
}

impl ProductFilter {
    pub(crate) fn owned_by(owner: UserId) -> Self {
        Self {
            owner: Some(owner),
            ..Self::default()
        }
    }

    pub(crate) fn matches(&self, product: &Product) -> bool {
        self.owner.is_none_or(|owner| product.owner == owner)
            && self.status.is_none_or(|status| product.status == status)
            && self.category.is_none_or(|category| product.category == category)
    }
}

/// A window over a newest-first listing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Page {
    pub(crate) offset: usize,
    pub(crate) limit: usize,
}
