//! Splitting the current basket into per-vendor orders

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lines of the current basket going to one vendor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorGroup {
    /// `None` collects parts without a vendor
    pub vendor_id: Option<Uuid>,
    pub invoice_number: Option<String>,
    pub unit_ids: Vec<Uuid>,
}

/// Group basket lines by the vendor of their part.
///
/// Groups come out in vendor id order with the vendorless group first, and
/// each group keeps the line order it was given.
pub fn split_by_vendor<I>(lines: I, invoices: &HashMap<Uuid, String>) -> Vec<VendorGroup>
where
    I: IntoIterator<Item = (Uuid, Option<Uuid>)>,
{
    let mut groups: BTreeMap<Option<Uuid>, Vec<Uuid>> = BTreeMap::new();
    for (unit_id, vendor_id) in lines {
        groups.entry(vendor_id).or_default().push(unit_id);
    }

    groups
        .into_iter()
        .map(|(vendor_id, unit_ids)| VendorGroup {
            vendor_id,
            invoice_number: vendor_id.and_then(|id| invoices.get(&id).cloned()),
            unit_ids,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_groups_lines_per_vendor() {
        let (acme, orto) = (Uuid::new_v4(), Uuid::new_v4());
        let lines: Vec<(Uuid, Option<Uuid>)> = vec![
            (Uuid::new_v4(), Some(acme)),
            (Uuid::new_v4(), Some(orto)),
            (Uuid::new_v4(), Some(acme)),
            (Uuid::new_v4(), None),
        ];
        let invoices = HashMap::from([(acme, "INV-2024-17".to_string())]);

        let groups = split_by_vendor(lines.clone(), &invoices);

        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].vendor_id, None);
        let acme_group = groups.iter().find(|g| g.vendor_id == Some(acme)).unwrap();
        assert_eq!(acme_group.unit_ids, vec![lines[0].0, lines[2].0]);
        assert_eq!(acme_group.invoice_number.as_deref(), Some("INV-2024-17"));
        let orto_group = groups.iter().find(|g| g.vendor_id == Some(orto)).unwrap();
        assert_eq!(orto_group.invoice_number, None);
    }

    #[test]
    fn test_split_of_empty_basket_is_empty() {
        assert!(split_by_vendor(Vec::new(), &HashMap::new()).is_empty());
    }
}
