use rand::{distributions::Alphanumeric, thread_rng, Rng};

pub fn random_string(length: usize) -> String {
    let mut rng = thread_rng();

    std::iter::repeat(())
        .map(|_| rng.sample(Alphanumeric) as char)
        .take(length)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_alphanumeric_strings_of_requested_length() {
        let key = random_string(32);

        assert_eq!(key.len(), 32);
        assert!(key.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn keys_are_not_repeated() {
        assert_ne!(random_string(32), random_string(32));
    }
}
