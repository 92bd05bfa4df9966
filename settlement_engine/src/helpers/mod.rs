use rand::RngCore;

use crate::db_types::OrderId;

/// Generate a fresh opaque order id. 128 random bits keeps ids unguessable, so the public id can safely appear in
/// processor metadata and client URLs.
pub fn new_order_id() -> OrderId {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    let token = bytes.iter().fold(String::with_capacity(32), |mut s, b| {
        s.push_str(&format!("{b:02x}"));
        s
    });
    OrderId(format!("ord-{token}"))
}

#[cfg(test)]
mod test {
    use super::new_order_id;

    #[test]
    fn order_ids_are_unique_and_well_formed() {
        let a = new_order_id();
        let b = new_order_id();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("ord-"));
        assert_eq!(a.as_str().len(), 4 + 32);
    }
}
