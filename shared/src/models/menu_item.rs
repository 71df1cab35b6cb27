//! Menu Item Model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

fn default_in_stock() -> bool {
    true
}

/// Menu item entity
///
/// Deleted items keep their row; `deleted_at` marks them inactive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: String,
    pub restaurant_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Price in currency unit
    pub price: Decimal,
    /// Free-form category tag, e.g. "Starters"
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub dietary_tags: Vec<String>,
    #[serde(default = "default_in_stock")]
    pub in_stock: bool,
    #[serde(default)]
    pub image_url: Option<String>,
    /// Soft-delete marker
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl MenuItem {
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Apply a partial update in place
    pub fn apply(&mut self, update: &MenuItemUpdate) {
        if let Some(name) = &update.name {
            self.name = name.clone();
        }
        if let Some(description) = &update.description {
            self.description = Some(description.clone());
        }
        if let Some(price) = update.price {
            self.price = price;
        }
        if let Some(category) = &update.category {
            self.category = category.clone();
        }
        if let Some(tags) = &update.dietary_tags {
            self.dietary_tags = tags.clone();
        }
        if let Some(in_stock) = update.in_stock {
            self.in_stock = in_stock;
        }
        if let Some(image_url) = &update.image_url {
            self.image_url = Some(image_url.clone());
        }
    }
}

/// Create menu item payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItemCreate {
    /// Row id to write; the backend assigns one when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub restaurant_id: String,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub category: String,
    #[serde(default)]
    pub dietary_tags: Vec<String>,
    #[serde(default = "default_in_stock")]
    pub in_stock: bool,
    pub image_url: Option<String>,
}

impl MenuItemCreate {
    /// Copy an existing row back into a create payload, id included (used
    /// to restore a menu snapshot)
    pub fn from_item(item: &MenuItem) -> Self {
        Self {
            id: Some(item.id.clone()),
            restaurant_id: item.restaurant_id.clone(),
            name: item.name.clone(),
            description: item.description.clone(),
            price: item.price,
            category: item.category.clone(),
            dietary_tags: item.dietary_tags.clone(),
            in_stock: item.in_stock,
            image_url: item.image_url.clone(),
        }
    }
}

/// Update menu item payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MenuItemUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dietary_tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_stock: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Display-ready menu: active items plus their categories in first-seen order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MenuSnapshot {
    pub items: Vec<MenuItem>,
    pub categories: Vec<String>,
}

impl MenuSnapshot {
    pub fn from_items(items: Vec<MenuItem>) -> Self {
        let items: Vec<MenuItem> = items.into_iter().filter(MenuItem::is_active).collect();
        let mut categories: Vec<String> = Vec::new();
        for item in &items {
            if !item.category.is_empty() && !categories.contains(&item.category) {
                categories.push(item.category.clone());
            }
        }
        Self { items, categories }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn find(&self, id: &str) -> Option<&MenuItem> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn in_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a MenuItem> + 'a {
        self.items.iter().filter(move |i| i.category == category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, category: &str, deleted: bool) -> MenuItem {
        MenuItem {
            id: id.to_string(),
            restaurant_id: "r-1".to_string(),
            name: format!("Item {id}"),
            description: None,
            price: Decimal::from(10),
            category: category.to_string(),
            dietary_tags: vec![],
            in_stock: true,
            image_url: None,
            deleted_at: deleted.then(Utc::now),
        }
    }

    #[test]
    fn test_snapshot_skips_deleted_and_orders_categories() {
        let snapshot = MenuSnapshot::from_items(vec![
            item("1", "Mains", false),
            item("2", "Starters", false),
            item("3", "Desserts", true),
            item("4", "Mains", false),
        ]);

        assert_eq!(snapshot.items.len(), 3);
        assert_eq!(snapshot.categories, vec!["Mains", "Starters"]);
        assert_eq!(snapshot.in_category("Mains").count(), 2);
        assert!(snapshot.find("3").is_none());
    }

    #[test]
    fn test_deserialize_defaults() {
        let json = r#"{"id":"m-1","restaurant_id":"r-1","name":"Tea","price":2.5}"#;
        let item: MenuItem = serde_json::from_str(json).unwrap();
        assert!(item.in_stock);
        assert!(item.is_active());
        assert_eq!(item.price, Decimal::new(25, 1));
        assert!(item.dietary_tags.is_empty());
    }

    #[test]
    fn test_apply_update() {
        let mut m = item("1", "Mains", false);
        m.apply(&MenuItemUpdate {
            price: Some(Decimal::from(12)),
            in_stock: Some(false),
            ..Default::default()
        });
        assert_eq!(m.price, Decimal::from(12));
        assert!(!m.in_stock);
        assert_eq!(m.category, "Mains");
    }

    #[test]
    fn test_create_from_item_keeps_id() {
        let create = MenuItemCreate::from_item(&item("m-7", "Mains", false));
        let json = serde_json::to_value(&create).unwrap();
        assert_eq!(json["id"], "m-7");

        let fresh = MenuItemCreate { id: None, ..create };
        let json = serde_json::to_value(&fresh).unwrap();
        assert!(json.get("id").is_none());
    }
}
