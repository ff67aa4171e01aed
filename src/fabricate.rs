// Fabricated attribute pools for signup and demographic payloads.
// All draws go through the injected RNG so a seeded run reproduces
// the same people.

use chrono::{Duration, NaiveDate};
use rand::seq::SliceRandom;
use rand::Rng;

const FIRST_NAMES: &[&str] = &[
    "James", "Mary", "Robert", "Patricia", "John", "Jennifer", "Michael", "Linda", "David",
    "Elizabeth", "William", "Barbara", "Richard", "Susan", "Joseph", "Jessica", "Thomas", "Sarah",
    "Charles", "Karen", "Christopher", "Lisa", "Daniel", "Nancy", "Matthew", "Betty", "Anthony",
    "Sandra", "Mark", "Margaret", "Donald", "Ashley", "Steven", "Kimberly", "Andrew", "Emily",
    "Paul", "Donna", "Joshua", "Michelle",
];

const LAST_NAMES: &[&str] = &[
    "Smith", "Johnson", "Williams", "Brown", "Jones", "Garcia", "Miller", "Davis", "Rodriguez",
    "Martinez", "Hernandez", "Lopez", "Gonzalez", "Wilson", "Anderson", "Thomas", "Taylor",
    "Moore", "Jackson", "Martin", "Lee", "Perez", "Thompson", "White", "Harris", "Sanchez",
    "Clark", "Ramirez", "Lewis", "Robinson", "Walker", "Young", "Allen", "King", "Wright",
    "Scott", "Torres", "Nguyen", "Hill", "Flores",
];

const EMAIL_DOMAINS: &[&str] = &[
    "example.com",
    "example.org",
    "example.net",
    "mail.example.com",
];

const STATE_ABBRS: &[&str] = &[
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "FL", "GA", "HI", "ID", "IL", "IN", "IA",
    "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH", "NJ",
    "NM", "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT", "VT",
    "VA", "WA", "WV", "WI", "WY",
];

pub fn first_name<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    FIRST_NAMES.choose(rng).copied().unwrap_or("Alex")
}

pub fn last_name<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    LAST_NAMES.choose(rng).copied().unwrap_or("Doe")
}

/// Email derived from the fabricated name plus a numeric suffix,
/// so distinct signups rarely collide.
pub fn email<R: Rng + ?Sized>(rng: &mut R, first: &str, last: &str) -> String {
    let domain = EMAIL_DOMAINS.choose(rng).copied().unwrap_or("example.com");
    let suffix: u16 = rng.gen_range(1..1000);
    format!(
        "{}.{}{}@{}",
        first.to_lowercase(),
        last.to_lowercase(),
        suffix,
        domain
    )
}

/// Date of birth for a subject aged 18 to 75 as of `today`.
pub fn date_of_birth<R: Rng + ?Sized>(rng: &mut R, today: NaiveDate) -> NaiveDate {
    let days = rng.gen_range((18 * 365)..=(75 * 365));
    today - Duration::days(days)
}

pub fn state_abbr<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    STATE_ABBRS.choose(rng).copied().unwrap_or("NY")
}

/// State abbreviation guaranteed to differ from `prior`.
/// Resamples until the draw changes, mirroring demographic-update semantics.
pub fn state_abbr_excluding<R: Rng + ?Sized>(rng: &mut R, prior: &str) -> &'static str {
    loop {
        let state = state_abbr(rng);
        if state != prior {
            return state;
        }
    }
}

/// Uniform positive amount with two-decimal precision, at most
/// `max_cents / 100`.
pub fn amount<R: Rng + ?Sized>(rng: &mut R, max_cents: i64) -> f64 {
    let cents = rng.gen_range(1..=max_cents.max(1));
    cents as f64 / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_email_shape() {
        let mut rng = StdRng::seed_from_u64(1);
        let email = email(&mut rng, "James", "Smith");
        assert!(email.starts_with("james.smith"));
        assert!(email.contains('@'));
    }

    #[test]
    fn test_date_of_birth_within_age_bounds() {
        let mut rng = StdRng::seed_from_u64(2);
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();

        for _ in 0..200 {
            let dob = date_of_birth(&mut rng, today);
            let age_days = (today - dob).num_days();
            assert!(age_days >= 18 * 365, "too young: {dob}");
            assert!(age_days <= 75 * 365, "too old: {dob}");
        }
    }

    #[test]
    fn test_state_excluding_never_returns_prior() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            assert_ne!(state_abbr_excluding(&mut rng, "CA"), "CA");
        }
    }

    #[test]
    fn test_amount_bounds_and_precision() {
        let mut rng = StdRng::seed_from_u64(4);
        for _ in 0..500 {
            let amount = amount(&mut rng, 5_000);
            assert!(amount > 0.0);
            assert!(amount <= 50.0);
            let cents = amount * 100.0;
            assert!((cents - cents.round()).abs() < 1e-9);
        }
    }
}
