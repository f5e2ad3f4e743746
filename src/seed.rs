use chrono::{Duration, SecondsFormat, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::domain::transaction::SubmitRequest;

const SOFT_DECLINE_CODES: [&str; 5] = [
    "insufficient_funds",
    "issuer_timeout",
    "do_not_honor",
    "processor_error",
    "authentication_failed",
];
const HARD_DECLINE_CODES: [&str; 4] =
    ["stolen_card", "fraud_suspected", "invalid_card", "expired_card"];

// Soft declines make up ~70% of the generated volume.
const SOFT_WEIGHTS: [f64; 5] = [0.30, 0.20, 0.25, 0.15, 0.10];

const CURRENCIES: [&str; 5] = ["USD", "BRL", "MXN", "COP", "PEN"];
const PROCESSORS: [&str; 5] =
    ["stripe_latam", "adyen_apac", "dlocal_br", "payu_mx", "mercadopago_co"];
const MERCHANTS: [&str; 3] = ["voltcommerce", "megastore_br", "shopfast_mx"];

/// Generate a realistic dataset of failed transactions for demos. A fixed
/// seed reproduces the same dataset.
pub fn generate_transactions(count: usize, seed: u64) -> Vec<SubmitRequest> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut transactions = Vec::with_capacity(count);

    let soft_count = (count as f64 * 0.70) as usize;
    let hard_count = count - soft_count;

    for i in 0..soft_count {
        let code = weighted_choice(&mut rng, &SOFT_DECLINE_CODES, &SOFT_WEIGHTS);
        transactions.push(generate_transaction(&mut rng, i + 1, code));
    }
    for i in 0..hard_count {
        let code = HARD_DECLINE_CODES[rng.gen_range(0..HARD_DECLINE_CODES.len())];
        transactions.push(generate_transaction(&mut rng, soft_count + i + 1, code));
    }

    transactions.shuffle(&mut rng);
    transactions
}

fn generate_transaction(rng: &mut StdRng, idx: usize, decline_code: &str) -> SubmitRequest {
    // Spread submission times uniformly over the trailing seven days.
    let window_secs = Duration::days(7).num_seconds();
    let timestamp = Utc::now() - Duration::seconds(rng.gen_range(0..window_secs));

    let amount = 10.0 + rng.gen::<f64>() * 990.0;
    let amount = (amount * 100.0).trunc() / 100.0;

    SubmitRequest {
        transaction_id: format!("txn_{idx:06}"),
        amount,
        currency: CURRENCIES[rng.gen_range(0..CURRENCIES.len())].to_string(),
        customer_id: format!("cust_{:06}", rng.gen_range(1..=5000)),
        merchant_id: MERCHANTS[rng.gen_range(0..MERCHANTS.len())].to_string(),
        original_processor: PROCESSORS[rng.gen_range(0..PROCESSORS.len())].to_string(),
        decline_code: decline_code.to_string(),
        timestamp: Some(timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)),
        webhook_url: None,
    }
}

fn weighted_choice<'a>(rng: &mut StdRng, items: &[&'a str], weights: &[f64]) -> &'a str {
    let total: f64 = weights.iter().sum();
    let r = rng.gen::<f64>() * total;
    let mut cumulative = 0.0;
    for (item, weight) in items.iter().zip(weights) {
        cumulative += weight;
        if r <= cumulative {
            return item;
        }
    }
    items[items.len() - 1]
}
