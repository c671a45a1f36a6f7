use super::*;
use std::str::FromStr;
use uuid::Uuid;

#[test]
fn test_typed_id_creation() {
    let id = CollectionId::new();
    assert!(!id.to_string().is_empty());
    assert!(!id.is_nil());
}

#[test]
fn test_typed_id_from_uuid() {
    let uuid = Uuid::new_v4();
    let id = PickerId::from_uuid(uuid);
    assert_eq!(id.into_inner(), uuid);
}

#[test]
fn test_typed_id_nil_is_missing() {
    assert!(ProjectId::from_uuid(Uuid::nil()).is_nil());
}

#[test]
fn test_typed_id_display() {
    let uuid = Uuid::new_v4();
    let id = CompanyId::from_uuid(uuid);
    assert_eq!(format!("{id}"), uuid.to_string());
}

#[test]
fn test_typed_id_from_str() {
    let uuid = Uuid::new_v4();
    let id = PaymentBatchId::from_str(&uuid.to_string()).unwrap();
    assert_eq!(id.into_inner(), uuid);
}

#[test]
fn test_typed_id_from_str_error() {
    assert!(PaymentBatchId::from_str("invalid").is_err());
}

#[test]
fn test_typed_ids_are_time_ordered() {
    let first = LedgerEntryId::new();
    let second = LedgerEntryId::new();
    assert!(first <= second);
}

#[test]
fn test_typed_id_serializes_transparently() {
    let uuid = Uuid::new_v4();
    let id = HarvestId::from_uuid(uuid);
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, format!("\"{uuid}\""));
}
