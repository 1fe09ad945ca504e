//! Validation utilities for the clinic inventory

use rust_decimal::Decimal;

use crate::types::Region;

/// Largest quantity a single request may move
pub const MAX_QUANTITY: i32 = 10_000;

// ============================================================================
// Stock Validations
// ============================================================================

/// Validate a requested unit quantity
pub fn validate_quantity(quantity: i32) -> Result<usize, &'static str> {
    if quantity < 0 {
        return Err("Quantity cannot be negative");
    }
    if quantity > MAX_QUANTITY {
        return Err("Quantity is too large");
    }
    Ok(quantity as usize)
}

/// Validate a unit price
pub fn validate_price(price: Decimal) -> Result<(), &'static str> {
    if price < Decimal::ZERO {
        return Err("Price cannot be negative");
    }
    Ok(())
}

/// Round a price to kopecks
pub fn normalize_price(price: Decimal) -> Decimal {
    price.round_dp(2)
}

/// Validate invoice number of a placed order
pub fn validate_invoice_number(number: &str) -> Result<(), &'static str> {
    if number.trim().is_empty() {
        return Err("Invoice number cannot be empty");
    }
    if number.chars().count() > 100 {
        return Err("Invoice number must be at most 100 characters");
    }
    Ok(())
}

// ============================================================================
// Integrity Validations
// ============================================================================

/// A job's prosthesis must come from the price list of the client's region
pub fn validate_prosthesis_region(
    client_region: Region,
    prosthesis_region: Region,
) -> Result<(), &'static str> {
    if client_region != prosthesis_region {
        return Err("Prosthesis region does not match the client region");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_validate_quantity() {
        assert_eq!(validate_quantity(0), Ok(0));
        assert_eq!(validate_quantity(12), Ok(12));
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(MAX_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_validate_price() {
        assert!(validate_price(Decimal::ZERO).is_ok());
        assert!(validate_price(Decimal::from(150)).is_ok());
        assert!(validate_price(Decimal::from(-1)).is_err());
    }

    #[test]
    fn test_normalize_price_rounds_to_two_places() {
        let price = Decimal::from_str("1234.5678").unwrap();
        assert_eq!(normalize_price(price), Decimal::from_str("1234.57").unwrap());
        assert_eq!(normalize_price(Decimal::from(7)), Decimal::from(7));
    }

    #[test]
    fn test_validate_invoice_number() {
        assert!(validate_invoice_number("INV-2024-117").is_ok());
        assert!(validate_invoice_number("").is_err());
        assert!(validate_invoice_number(&"9".repeat(101)).is_err());
    }

    #[test]
    fn test_validate_prosthesis_region() {
        assert!(validate_prosthesis_region(Region::Moscow, Region::Moscow).is_ok());
        assert!(validate_prosthesis_region(Region::Moscow, Region::MoscowRegion).is_err());
    }

    proptest::proptest! {
        #[test]
        fn prop_normalized_price_is_stable(units in -1_000_000_000i64..1_000_000_000, scale in 0u32..6) {
            let price = Decimal::new(units, scale);
            let normalized = normalize_price(price);
            proptest::prop_assert!(normalized.scale() <= 2);
            proptest::prop_assert_eq!(normalize_price(normalized), normalized);
            proptest::prop_assert!((normalized - price).abs() <= Decimal::new(5, 3));
        }
    }
}
