use std::time::Duration;

use reqwest::{StatusCode, Url};
use serde_json::Value;

use crate::bus::Bus;
use crate::errors::{BackendError, Result};
use crate::model::Product;
use crate::operations::product::LookupProduct;
use crate::settings::Products as ProductsCfg;

/// Client for the upstream barcode service.
#[derive(Clone)]
pub struct ProductLookup {
    client: reqwest::Client,
    base_url: Url,
}

impl ProductLookup {
    pub fn new(cfg: &ProductsCfg) -> Result<Self> {
        let base_url = Url::parse(&cfg.lookup_url)
            .map_err(|e| BackendError::Other(format!("Invalid products.lookup_url: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(BackendError::Other(format!(
                "products.lookup_url cannot be a base URL: {}",
                cfg.lookup_url
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.lookup_timeout_secs))
            .build()?;
        Ok(Self { client, base_url })
    }

    fn url_for(&self, code: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(code);
        }
        url
    }

    pub async fn lookup(&self, code: &str) -> Result<Option<Product>> {
        let url = self.url_for(code);
        tracing::debug!(%url, "Querying barcode service");

        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: Value = response.error_for_status()?.json().await?;
        Ok(parse_lookup(code, &body))
    }

    pub fn register(self, bus: &Bus) -> Result<()> {
        bus.on_ask::<LookupProduct, _, _>(move |code| {
            let lookup = self.clone();
            async move { lookup.lookup(&code).await }
        })
    }
}

fn text(product: &Value, key: &str) -> Option<String> {
    product
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Map a barcode service response to a product. `status: 0` means unknown code.
fn parse_lookup(code: &str, body: &Value) -> Option<Product> {
    if body.get("status").and_then(Value::as_i64) == Some(0) {
        return None;
    }
    let product = body.get("product")?;

    let price = match product.get("price") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
    .unwrap_or(0.0);

    Some(Product {
        code: code.to_string(),
        name: text(product, "product_name").or_else(|| text(product, "product_name_fr")),
        price,
        image: text(product, "image_url"),
        ingredients: text(product, "image_ingredients_url"),
        brand: text(product, "brands"),
        nutri_score: text(product, "nutriscore_grade"),
        raw: Some(product.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_found_product() {
        let body = json!({
            "status": 1,
            "code": "20020392",
            "product": {
                "product_name": "",
                "product_name_fr": "Sirop de grenadine",
                "price": "4.2",
                "image_url": "https://images.example/20020392.jpg",
                "brands": "Plein Sud",
                "nutriscore_grade": "e",
            }
        });
        let product = parse_lookup("20020392", &body).unwrap();

        assert_eq!(product.code, "20020392");
        assert_eq!(product.name.as_deref(), Some("Sirop de grenadine"));
        assert_eq!(product.price, 4.2);
        assert_eq!(product.brand.as_deref(), Some("Plein Sud"));
        assert_eq!(product.nutri_score.as_deref(), Some("e"));
        assert_eq!(product.ingredients, None);
        assert_eq!(product.raw.unwrap()["brands"], "Plein Sud");
    }

    #[test]
    fn test_product_keeps_requested_code() {
        let body = json!({
            "status": 1,
            "code": "20020392",
            "product": { "product_name": "Grenadine" }
        });
        let product = parse_lookup("020020392", &body).unwrap();
        assert_eq!(product.code, "020020392");
    }

    #[test]
    fn test_parse_unknown_product() {
        assert!(parse_lookup("1", &json!({ "status": 0, "status_verbose": "product not found" })).is_none());
        assert!(parse_lookup("1", &json!({ "status": 1 })).is_none());
    }

    #[test]
    fn test_missing_price_defaults_to_zero() {
        let product = parse_lookup("42", &json!({ "product": { "product_name": "Water" } })).unwrap();
        assert_eq!(product.code, "42");
        assert_eq!(product.price, 0.0);
    }

    #[test]
    fn test_url_for_escapes_code() {
        let lookup = ProductLookup::new(&ProductsCfg {
            lookup_url: "http://tungsten.ovh:7575/barcode/".to_string(),
            lookup_timeout_secs: 1,
        })
        .unwrap();

        assert_eq!(
            lookup.url_for("20020392").as_str(),
            "http://tungsten.ovh:7575/barcode/20020392"
        );
        assert_eq!(
            lookup.url_for("../admin").as_str(),
            "http://tungsten.ovh:7575/barcode/..%2Fadmin"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let err = ProductLookup::new(&ProductsCfg {
            lookup_url: "not a url".to_string(),
            lookup_timeout_secs: 1,
        });
        assert!(err.is_err());
    }
}
