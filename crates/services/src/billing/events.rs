//! Typed view over the subset of billing webhook payloads the reconciler acts on.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;

use super::ports::BillingError;

pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";
pub const INVOICE_PAYMENT_SUCCEEDED: &str = "invoice.payment_succeeded";
pub const CUSTOMER_SUBSCRIPTION_DELETED: &str = "customer.subscription.deleted";

/// Invoice billing reason for a renewal of an existing subscription
pub const BILLING_REASON_SUBSCRIPTION_CYCLE: &str = "subscription_cycle";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingEvent {
    CheckoutCompleted {
        identity: Option<String>,
        customer_ref: Option<String>,
        subscription_ref: Option<String>,
    },
    InvoicePaid {
        subscription_ref: Option<String>,
        billing_reason: Option<String>,
    },
    SubscriptionDeleted {
        subscription_ref: Option<String>,
    },
    Other,
}

#[derive(Debug, Clone)]
pub struct ParsedEvent {
    pub id: Option<String>,
    pub event_type: String,
    pub event: BillingEvent,
    pub payload: serde_json::Value,
}

#[derive(Deserialize)]
struct RawEvent {
    id: Option<String>,
    #[serde(rename = "type")]
    event_type: String,
    data: Option<RawEventData>,
}

#[derive(Deserialize)]
struct RawEventData {
    #[serde(default)]
    object: serde_json::Value,
}

/// A reference that may arrive either as a bare id or as an expanded object
#[derive(Deserialize)]
#[serde(untagged)]
enum ExpandableRef {
    Id(String),
    Object { id: String },
}

impl ExpandableRef {
    fn into_id(self) -> String {
        match self {
            ExpandableRef::Id(id) => id,
            ExpandableRef::Object { id } => id,
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct CheckoutSessionObject {
    metadata: Option<HashMap<String, String>>,
    customer: Option<ExpandableRef>,
    subscription: Option<ExpandableRef>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct InvoiceObject {
    subscription: Option<ExpandableRef>,
    billing_reason: Option<String>,
    parent: Option<InvoiceParent>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct InvoiceParent {
    subscription_details: Option<InvoiceSubscriptionDetails>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct InvoiceSubscriptionDetails {
    subscription: Option<ExpandableRef>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct SubscriptionObject {
    id: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn object_as<T: DeserializeOwned + Default>(object: serde_json::Value) -> Result<T, BillingError> {
    if object.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(object).map_err(|e| BillingError::InvalidPayload(e.to_string()))
}

/// Parse a verified webhook body. Unknown event types parse to `BillingEvent::Other`.
pub fn parse_event(payload: &[u8]) -> Result<ParsedEvent, BillingError> {
    let payload_json: serde_json::Value = serde_json::from_slice(payload)
        .map_err(|e| BillingError::InvalidPayload(format!("Invalid JSON: {e}")))?;
    let raw: RawEvent = serde_json::from_value(payload_json.clone())
        .map_err(|e| BillingError::InvalidPayload(e.to_string()))?;

    let object = raw.data.map(|d| d.object).unwrap_or_default();

    let event = match raw.event_type.as_str() {
        CHECKOUT_SESSION_COMPLETED => {
            let session: CheckoutSessionObject = object_as(object)?;
            BillingEvent::CheckoutCompleted {
                identity: non_empty(session.metadata.and_then(|mut m| m.remove("identity"))),
                customer_ref: non_empty(session.customer.map(ExpandableRef::into_id)),
                subscription_ref: non_empty(session.subscription.map(ExpandableRef::into_id)),
            }
        }
        INVOICE_PAYMENT_SUCCEEDED => {
            let invoice: InvoiceObject = object_as(object)?;
            let subscription = invoice.subscription.or_else(|| {
                invoice
                    .parent
                    .and_then(|p| p.subscription_details)
                    .and_then(|d| d.subscription)
            });
            BillingEvent::InvoicePaid {
                subscription_ref: non_empty(subscription.map(ExpandableRef::into_id)),
                billing_reason: invoice.billing_reason,
            }
        }
        CUSTOMER_SUBSCRIPTION_DELETED => {
            let subscription: SubscriptionObject = object_as(object)?;
            BillingEvent::SubscriptionDeleted {
                subscription_ref: non_empty(subscription.id),
            }
        }
        _ => BillingEvent::Other,
    };

    Ok(ParsedEvent {
        id: non_empty(raw.id),
        event_type: raw.event_type,
        event,
        payload: payload_json,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> ParsedEvent {
        parse_event(value.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn test_checkout_with_identity() {
        let parsed = parse(json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": { "object": {
                "metadata": { "identity": "u1" },
                "customer": "cus_1",
                "subscription": "sub_1"
            }}
        }));

        assert_eq!(parsed.id.as_deref(), Some("evt_1"));
        assert_eq!(
            parsed.event,
            BillingEvent::CheckoutCompleted {
                identity: Some("u1".into()),
                customer_ref: Some("cus_1".into()),
                subscription_ref: Some("sub_1".into()),
            }
        );
    }

    #[test]
    fn test_checkout_blank_identity_and_expanded_customer() {
        let parsed = parse(json!({
            "type": "checkout.session.completed",
            "data": { "object": {
                "metadata": { "identity": "  " },
                "customer": { "id": "cus_9", "object": "customer" },
                "subscription": null
            }}
        }));

        assert!(parsed.id.is_none());
        assert_eq!(
            parsed.event,
            BillingEvent::CheckoutCompleted {
                identity: None,
                customer_ref: Some("cus_9".into()),
                subscription_ref: None,
            }
        );
    }

    #[test]
    fn test_invoice_subscription_from_parent_details() {
        let parsed = parse(json!({
            "type": "invoice.payment_succeeded",
            "data": { "object": {
                "billing_reason": "subscription_cycle",
                "parent": { "subscription_details": { "subscription": "sub_2" } }
            }}
        }));

        assert_eq!(
            parsed.event,
            BillingEvent::InvoicePaid {
                subscription_ref: Some("sub_2".into()),
                billing_reason: Some("subscription_cycle".into()),
            }
        );
    }

    #[test]
    fn test_subscription_deleted_uses_object_id() {
        let parsed = parse(json!({
            "type": "customer.subscription.deleted",
            "data": { "object": { "id": "sub_1", "customer": "cus_1" } }
        }));

        assert_eq!(
            parsed.event,
            BillingEvent::SubscriptionDeleted {
                subscription_ref: Some("sub_1".into())
            }
        );
    }

    #[test]
    fn test_unknown_type_is_other() {
        let parsed = parse(json!({ "type": "customer.created", "data": { "object": {} } }));
        assert_eq!(parsed.event, BillingEvent::Other);
        assert_eq!(parsed.event_type, "customer.created");
    }

    #[test]
    fn test_rejects_non_json_and_missing_type() {
        assert!(matches!(
            parse_event(b"not json"),
            Err(BillingError::InvalidPayload(_))
        ));
        assert!(matches!(
            parse_event(br#"{"id":"evt_1"}"#),
            Err(BillingError::InvalidPayload(_))
        ));
    }
}
