use rand::distributions::{Distribution, Uniform};
use rand::Rng;

/// Uppercase alphabet without 0/O and 1/I so codes survive being read aloud.
const ACTIVATION_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const ACTIVATION_PREFIX: &str = "CP-";
const ACTIVATION_BODY_LEN: usize = 10;

pub const MIN_PIN_LENGTH: usize = 4;
pub const MAX_PIN_LENGTH: usize = 10;

pub trait CredentialGenerator: Send + Sync {
    fn activation_code(&self) -> String;
    fn pin_code(&self) -> String;
}

#[derive(Debug, Clone)]
pub struct RandomCredentialGenerator {
    pin_length: usize,
}

impl RandomCredentialGenerator {
    pub fn new(pin_length: usize) -> Self {
        Self {
            pin_length: pin_length.clamp(MIN_PIN_LENGTH, MAX_PIN_LENGTH),
        }
    }
}

impl Default for RandomCredentialGenerator {
    fn default() -> Self {
        Self::new(6)
    }
}

impl CredentialGenerator for RandomCredentialGenerator {
    fn activation_code(&self) -> String {
        let mut rng = rand::thread_rng();
        let pick = Uniform::from(0..ACTIVATION_ALPHABET.len());
        let body: String = (0..ACTIVATION_BODY_LEN)
            .map(|_| ACTIVATION_ALPHABET[pick.sample(&mut rng)] as char)
            .collect();
        format!("{}{}", ACTIVATION_PREFIX, body)
    }

    fn pin_code(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..self.pin_length)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect()
    }
}
