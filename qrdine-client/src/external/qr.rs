//! QR image links
//!
//! Tables are bound to a guest session through a link carrying the
//! restaurant id, the canonical table id and the display number. The QR
//! image itself comes from an external service given that link.

use reqwest::Url;
use shared::models::DiningTable;

use crate::{ClientError, ClientResult};

/// Canonical guest link for a table (`?rid=..&tableId=..&tableNo=..`)
pub fn table_link(app_base: &str, table: &DiningTable) -> ClientResult<Url> {
    let mut url = Url::parse(app_base)
        .map_err(|e| ClientError::Validation(format!("invalid app url {app_base}: {e}")))?;
    url.query_pairs_mut()
        .clear()
        .append_pair("rid", &table.restaurant_id)
        .append_pair("tableId", &table.id)
        .append_pair("tableNo", &table.table_number.to_string());
    Ok(url)
}

/// Image URL from the QR service encoding `target`
pub fn qr_image_url(service_base: &str, target: &Url, size: u32) -> ClientResult<Url> {
    let mut url = Url::parse(service_base)
        .map_err(|e| ClientError::Validation(format!("invalid qr service url {service_base}: {e}")))?;
    url.query_pairs_mut()
        .append_pair("size", &format!("{size}x{size}"))
        .append_pair("data", target.as_str());
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> DiningTable {
        DiningTable {
            id: "t-1".into(),
            restaurant_id: "r-1".into(),
            table_number: 5,
        }
    }

    #[test]
    fn test_table_link() {
        let link = table_link("https://order.example.com/menu", &table()).unwrap();
        assert_eq!(
            link.as_str(),
            "https://order.example.com/menu?rid=r-1&tableId=t-1&tableNo=5"
        );
    }

    #[test]
    fn test_qr_image_url_encodes_target() {
        let link = table_link("https://order.example.com/", &table()).unwrap();
        let qr = qr_image_url("https://qr.example.com/v1/create-qr-code/", &link, 300).unwrap();
        let pairs: Vec<(String, String)> = qr
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(pairs[0], ("size".into(), "300x300".into()));
        assert_eq!(pairs[1].1, link.as_str());
    }

    #[test]
    fn test_invalid_base() {
        assert!(table_link("not a url", &table()).is_err());
    }
}
