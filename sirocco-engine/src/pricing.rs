//! Cross-rate price search.
//!
//! Converts an arbitrary balance currency into a reference currency using
//! the adapter's instrument book: identity, then the direct pair's ask, then
//! the inverse pair, then a bounded-depth walk over the symbol catalog
//! composing one hop at a time. A price of zero is the "no path" sentinel
//! and is propagated; triggers evaluating against zero totals simply do not
//! fire.

use rust_decimal::Decimal;
use sirocco_gateway::{CurrencyCode, Gateway};

/// Maximum recursion depth of the catalog walk.
pub const MAX_HOPS: u8 = 5;

/// Returns the price of `base` in `quote`, or zero when no path resolves.
///
/// Ties between candidate hop paths break on catalog order, which is the
/// adapter's responsibility. Callers start at `depth = 0`.
#[must_use]
pub fn price(gateway: &dyn Gateway, base: &CurrencyCode, quote: &CurrencyCode, depth: u8) -> Decimal {
    if base == quote {
        return Decimal::ONE;
    }

    if let Some(instrument) = gateway.instrument(&format!("{base}{quote}")) {
        let (_, ask) = instrument.price();
        return ask;
    }

    if let Some(instrument) = gateway.instrument(&format!("{quote}{base}")) {
        let (_, ask) = instrument.price();
        if ask.is_zero() {
            return Decimal::ZERO;
        }
        return Decimal::ONE / ask;
    }

    if depth >= MAX_HOPS {
        return Decimal::ZERO;
    }

    for symbol in gateway.all_symbols() {
        if symbol.base != *base {
            continue;
        }
        let onward = price(gateway, &symbol.quote, quote, depth + 1);
        if onward.is_zero() {
            continue;
        }
        // The hop leg itself must resolve directly; passing MAX_HOPS keeps
        // the walk from re-entering the catalog and guarantees termination
        // on cyclic catalogs.
        let through = price(gateway, &symbol.base, &symbol.quote, MAX_HOPS);
        let composed = through * onward;
        if !composed.is_zero() {
            return composed;
        }
    }

    Decimal::ZERO
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use sirocco_gateway::mock::MockGateway;

    fn code(text: &str) -> CurrencyCode {
        CurrencyCode::new(text)
    }

    #[test]
    fn test_identity() {
        let gateway = MockGateway::new("Test");
        assert_eq!(price(&gateway, &code("ETH"), &code("ETH"), 0), dec!(1));
        assert_eq!(price(&gateway, &code("USDT"), &code("USDT"), 0), dec!(1));
    }

    #[test]
    fn test_direct_uses_ask() {
        let gateway =
            MockGateway::new("Test").with_instrument("ETH", "DOGE", dec!(10.4), dec!(10.5));
        assert_eq!(price(&gateway, &code("ETH"), &code("DOGE"), 0), dec!(10.5));
    }

    #[test]
    fn test_inverse() {
        let gateway = MockGateway::new("Test").with_instrument("ETH", "DOGE", dec!(9), dec!(10));
        assert_eq!(price(&gateway, &code("DOGE"), &code("ETH"), 0), dec!(0.1));
    }

    #[test]
    fn test_inverse_zero_ask() {
        let gateway = MockGateway::new("Test").with_instrument("ETH", "DOGE", dec!(0), dec!(0));
        assert_eq!(
            price(&gateway, &code("DOGE"), &code("ETH"), 0),
            Decimal::ZERO
        );
    }

    #[test]
    fn test_recursive_hop() {
        // ETH/DOGE quoted nowhere; ETH -> USDT -> DOGE composes to 40000.
        let gateway = MockGateway::new("Test")
            .with_instrument("ETH", "USDT", dec!(199), dec!(200))
            .with_instrument("USDT", "DOGE", dec!(199), dec!(200));
        assert_eq!(
            price(&gateway, &code("ETH"), &code("DOGE"), 0),
            dec!(40000)
        );
    }

    #[test]
    fn test_no_path_resolves_to_zero() {
        let gateway = MockGateway::new("Test").with_instrument("ETH", "USDT", dec!(199), dec!(200));
        assert_eq!(
            price(&gateway, &code("ETH"), &code("DOGE"), 0),
            Decimal::ZERO
        );
    }

    #[test]
    fn test_depth_bound_on_long_chain() {
        // C0 -> C1 -> ... -> C7: the target sits more than five hops away,
        // so the walk gives up and returns the sentinel.
        let mut gateway = MockGateway::new("Test");
        for i in 0..7 {
            gateway = gateway.with_instrument(
                &format!("C{i}"),
                &format!("C{}", i + 1),
                dec!(1),
                dec!(2),
            );
        }
        assert_eq!(price(&gateway, &code("C0"), &code("C7"), 0), Decimal::ZERO);
    }

    #[test]
    fn test_chain_within_depth_resolves() {
        let mut gateway = MockGateway::new("Test");
        for i in 0..4 {
            gateway = gateway.with_instrument(
                &format!("C{i}"),
                &format!("C{}", i + 1),
                dec!(1),
                dec!(2),
            );
        }
        // Four hops of ask 2 compose to 16.
        assert_eq!(price(&gateway, &code("C0"), &code("C4"), 0), dec!(16));
    }

    #[test]
    fn test_cyclic_catalog_terminates() {
        // A and B quote each other but neither reaches the target; the
        // bounded walk must terminate with the sentinel instead of looping.
        let gateway = MockGateway::new("Test")
            .with_instrument("AAA", "BBB", dec!(1), dec!(2))
            .with_instrument("BBB", "AAA", dec!(1), dec!(2));
        assert_eq!(
            price(&gateway, &code("AAA"), &code("ZZZ"), 0),
            Decimal::ZERO
        );
    }
}
