//! Checkout payload as submitted by the storefront.
//!
//! Every field is optional here so that a structurally incomplete payload
//! still deserializes and can be reported field by field by
//! [`validate`](super::validation::validate).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::validation::FieldError;

const TOTAL_FIELDS: [&str; 4] = ["subtotal", "shipping", "tax", "total"];
const ADDRESS_FIELDS: [&str; 6] = ["name", "phone", "address", "city", "state", "zip"];

/// Body of an order placement request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    pub items: Option<Vec<CartItemRequest>>,
    pub subtotal: Option<f64>,
    pub shipping: Option<f64>,
    pub tax: Option<f64>,
    pub total: Option<f64>,
    pub payment_method: Option<String>,
    pub shipping_address: Option<AddressRequest>,
    pub billing_address: Option<AddressRequest>,
}

/// One cart line. Prices are in whole currency units as displayed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItemRequest {
    pub product_id: Option<String>,
    pub quantity: Option<f64>,
    pub price: Option<f64>,
    pub name: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddressRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
}

#[derive(Clone, Copy)]
enum Kind {
    Number,
    String,
}

fn expect(errors: &mut Vec<FieldError>, path: String, value: Option<&Value>, kind: Kind) {
    match (kind, value) {
        (_, None | Some(Value::Null)) => {}
        (Kind::Number, Some(Value::Number(_))) | (Kind::String, Some(Value::String(_))) => {}
        (Kind::Number, Some(_)) => errors.push(FieldError::new(path, "must be a number")),
        (Kind::String, Some(_)) => errors.push(FieldError::new(path, "must be a string")),
    }
}

fn object<'a>(
    errors: &mut Vec<FieldError>,
    path: &str,
    value: Option<&'a Value>,
) -> Option<&'a Map<String, Value>> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => Some(map),
        Some(_) => {
            errors.push(FieldError::new(path, "must be an object"));
            None
        }
    }
}

impl PlaceOrderRequest {
    /// Reads a checkout payload from JSON.
    ///
    /// Fields holding the wrong JSON type are reported by path, the same way
    /// [`validate`](super::validation::validate) reports missing ones.
    pub fn from_value(value: &Value) -> Result<Self, Vec<FieldError>> {
        let mut errors = Vec::new();
        let Some(root) = value.as_object() else {
            return Err(vec![FieldError::new("", "must be an object")]);
        };

        match root.get("items") {
            None | Some(Value::Null) => {}
            Some(Value::Array(items)) => {
                for (i, item) in items.iter().enumerate() {
                    let prefix = format!("items[{i}]");
                    let Some(item) = object(&mut errors, &prefix, Some(item)) else {
                        continue;
                    };
                    for field in ["productId", "name", "image"] {
                        expect(&mut errors, format!("{prefix}.{field}"), item.get(field), Kind::String);
                    }
                    for field in ["quantity", "price"] {
                        expect(&mut errors, format!("{prefix}.{field}"), item.get(field), Kind::Number);
                    }
                }
            }
            Some(_) => errors.push(FieldError::new("items", "must be an array")),
        }

        for field in TOTAL_FIELDS {
            expect(&mut errors, field.to_string(), root.get(field), Kind::Number);
        }
        expect(&mut errors, "paymentMethod".to_string(), root.get("paymentMethod"), Kind::String);

        for prefix in ["shippingAddress", "billingAddress"] {
            if let Some(address) = object(&mut errors, prefix, root.get(prefix)) {
                for field in ADDRESS_FIELDS {
                    expect(&mut errors, format!("{prefix}.{field}"), address.get(field), Kind::String);
                }
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }
        PlaceOrderRequest::deserialize(value).map_err(|e| vec![FieldError::new("", e.to_string())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_a_well_typed_payload() {
        let req = PlaceOrderRequest::from_value(&json!({
            "items": [{"productId": "P1", "quantity": 2, "price": 150.5, "name": "Kiondo"}],
            "total": 301,
            "paymentMethod": "cod",
            "shippingAddress": {"name": "Amina", "phone": null}
        }))
        .unwrap();

        let items = req.items.unwrap();
        assert_eq!(items[0].quantity, Some(2.0));
        assert_eq!(req.total, Some(301.0));
        assert_eq!(req.shipping_address.unwrap().phone, None);
    }

    #[test]
    fn wrong_types_are_reported_by_path() {
        let errors = PlaceOrderRequest::from_value(&json!({
            "items": [{"productId": 7, "quantity": "3", "price": 100, "name": "Kiondo"}, "P2"],
            "tax": "16%",
            "paymentMethod": "cod",
            "billingAddress": "same as shipping"
        }))
        .unwrap_err();

        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["items[0].productId", "items[0].quantity", "items[1]", "tax", "billingAddress"]
        );
        assert_eq!(errors[1].message, "must be a number");
        assert_eq!(errors[0].message, "must be a string");
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let errors = PlaceOrderRequest::from_value(&json!([1, 2])).unwrap_err();
        assert_eq!(errors[0].message, "must be an object");
    }
}
