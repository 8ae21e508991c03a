//! Per-shop cart partitioning and subtotals.

use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::models::{round_money, CartLine, ShopBreakdown};

/// Groups cart lines by canonical shop id and sums each group's subtotal.
///
/// Shop references are normalised first (raw id or embedded shop object);
/// lines with no usable shop reference are skipped rather than rejected.
/// Aggregation is order-independent.
pub fn partition_by_shop(lines: &[CartLine]) -> HashMap<String, ShopBreakdown> {
    let mut groups: HashMap<String, ShopBreakdown> = HashMap::new();

    for line in lines {
        let Some(shop_id) = line.shop.as_ref().and_then(|shop| shop.canonical_id()) else {
            continue;
        };
        let group = groups.entry(shop_id.to_string()).or_default();
        group.subtotal += line.line_total();
        group.lines.push(line.clone());
    }

    for group in groups.values_mut() {
        group.subtotal = round_money(group.subtotal);
    }

    groups
}

/// Whole-cart subtotal, rounded to 2 decimals.
pub fn subtotal(lines: &[CartLine]) -> Decimal {
    round_money(lines.iter().map(CartLine::line_total).sum())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EmbeddedShop, ShopRef};
    use rust_decimal_macros::dec;

    fn line(product: &str, shop: Option<ShopRef>, qty: u32, price: Decimal) -> CartLine {
        CartLine {
            product_id: product.to_string(),
            shop,
            quantity: qty,
            unit_discount_price: price,
            transportation_type: None,
            variant_size: None,
            variant_color: None,
            is_event: false,
        }
    }

    #[test]
    fn groups_by_shop_and_sums_subtotals() {
        let cart = vec![
            line("p1", Some(ShopRef::Id("s1".to_string())), 2, dec!(100)),
            line("p2", Some(ShopRef::Id("s2".to_string())), 1, dec!(40)),
            line("p3", Some(ShopRef::Id("s1".to_string())), 3, dec!(10)),
        ];

        let groups = partition_by_shop(&cart);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["s1"].subtotal, dec!(230));
        assert_eq!(groups["s1"].lines.len(), 2);
        assert_eq!(groups["s2"].subtotal, dec!(40));
    }

    #[test]
    fn embedded_shop_objects_group_with_raw_ids() {
        let embedded = ShopRef::Embedded(EmbeddedShop {
            id: "s1".to_string(),
            name: Some("Corner Store".to_string()),
        });
        let cart = vec![
            line("p1", Some(ShopRef::Id("s1".to_string())), 1, dec!(10)),
            line("p2", Some(embedded), 1, dec!(15)),
        ];

        let groups = partition_by_shop(&cart);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups["s1"].subtotal, dec!(25));
    }

    #[test]
    fn lines_without_a_shop_reference_are_skipped() {
        let cart = vec![
            line("p1", None, 1, dec!(10)),
            line("p2", Some(ShopRef::Id("  ".to_string())), 1, dec!(20)),
            line("p3", Some(ShopRef::Id("s1".to_string())), 1, dec!(30)),
        ];

        let groups = partition_by_shop(&cart);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups["s1"].subtotal, dec!(30));
    }

    #[test]
    fn aggregation_is_order_independent() {
        let mut cart = vec![
            line("p1", Some(ShopRef::Id("s1".to_string())), 2, dec!(100)),
            line("p2", Some(ShopRef::Id("s2".to_string())), 1, dec!(40)),
            line("p3", Some(ShopRef::Id("s1".to_string())), 3, dec!(10)),
        ];
        let forward = partition_by_shop(&cart);
        cart.reverse();
        let backward = partition_by_shop(&cart);

        assert_eq!(forward["s1"].subtotal, backward["s1"].subtotal);
        assert_eq!(forward["s2"].subtotal, backward["s2"].subtotal);
    }

    #[test]
    fn whole_cart_subtotal_rounds_to_two_decimals() {
        let cart = vec![
            line("p1", Some(ShopRef::Id("s1".to_string())), 3, dec!(33.333)),
        ];
        assert_eq!(subtotal(&cart), dec!(100.00));
        assert_eq!(subtotal(&[]), dec!(0));
    }
}
