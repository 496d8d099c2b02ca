use bcrypt::BcryptError;

const BCRYPT_COST: u32 = 10;
const SPECIAL_CHARACTERS: &str = "!@#$%^&*(),.?\":{}|<>";
pub const MIN_PASSWORD_LENGTH: usize = 8;

pub fn hash_password(password: &str) -> Result<String, BcryptError> {
    bcrypt::hash(password, BCRYPT_COST)
}

/// Malformed stored hashes count as a mismatch.
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// Returns every unmet rule; an empty list means the password is acceptable.
pub fn validate_password_strength(password: &str) -> Vec<&'static str> {
    let mut problems = Vec::new();

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        problems.push("Password must be at least 8 characters long");
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        problems.push("Password must contain at least one uppercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        problems.push("Password must contain at least one lowercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        problems.push("Password must contain at least one number");
    }
    if !password.chars().any(|c| SPECIAL_CHARACTERS.contains(c)) {
        problems.push("Password must contain at least one special character");
    }

    problems
}
