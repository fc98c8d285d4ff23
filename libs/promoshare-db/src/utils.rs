use rand::Rng;

const PROMO_CODE_LEN: usize = 6;
const PROMO_CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Random 6-character uppercase alphanumeric code. Uniqueness is the
/// caller's job (checked against the users table before insert).
pub fn generate_promo_code() -> String {
    let mut rng = rand::rng();
    (0..PROMO_CODE_LEN)
        .map(|_| {
            let idx = rng.random_range(0..PROMO_CODE_CHARSET.len());
            PROMO_CODE_CHARSET[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promo_code_shape() {
        for _ in 0..100 {
            let code = generate_promo_code();
            assert_eq!(code.len(), 6);
            assert!(code
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }
}
