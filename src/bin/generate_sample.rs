use anyhow::{Context, Result};

const ROWS: usize = 2_000;

const JOBS: [&str; 8] = [
    "admin.",
    "blue-collar",
    "technician",
    "services",
    "management",
    "retired",
    "student",
    "unemployed",
];
const MARITAL: [&str; 3] = ["married", "single", "divorced"];
const FLAGS: [&str; 3] = ["no", "yes", "unknown"];
const CONTACT: [&str; 2] = ["cellular", "telephone"];
const MONTHS: [&str; 10] = ["mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec"];
const DAYS: [&str; 5] = ["mon", "tue", "wed", "thu", "fri"];

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }

    /// Pick from `items` with decreasing weight for later entries.
    fn pick<'a>(&mut self, items: &[&'a str]) -> &'a str {
        let r = self.next_f64().powf(1.6);
        items[((r * items.len() as f64) as usize).min(items.len() - 1)]
    }
}

fn main() -> Result<()> {
    let mut rng = SimpleRng::new(42);

    let output_path = "bank_sample.csv";
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_path(output_path)
        .with_context(|| format!("creating {output_path}"))?;

    writer.write_record([
        "age",
        "job",
        "marital",
        "default",
        "housing",
        "loan",
        "contact",
        "month",
        "day_of_week",
        "duration",
        "campaign",
        "y",
    ])?;

    let mut accepted = 0usize;
    for _ in 0..ROWS {
        let job = rng.pick(&JOBS);
        let age = match job {
            "student" => rng.gauss(24.0, 4.0),
            "retired" => rng.gauss(66.0, 7.0),
            _ => rng.gauss(40.0, 10.0),
        }
        .clamp(17.0, 98.0)
        .round() as i64;

        let contact = rng.pick(&CONTACT);
        let duration = rng.gauss(260.0, 180.0).max(0.0).round() as i64;
        let campaign = 1 + (rng.next_f64().powi(3) * 12.0) as i64;

        // Longer calls, cellular contact and the age extremes convert more often.
        let mut p_yes = 0.04 + (duration as f64 / 1_500.0).min(0.5);
        if contact == "cellular" {
            p_yes += 0.05;
        }
        if !(25..=60).contains(&age) {
            p_yes += 0.12;
        }
        let y = if rng.next_f64() < p_yes { "yes" } else { "no" };
        accepted += usize::from(y == "yes");

        writer.write_record([
            age.to_string().as_str(),
            job,
            rng.pick(&MARITAL),
            rng.pick(&FLAGS),
            rng.pick(&FLAGS),
            rng.pick(&FLAGS),
            contact,
            rng.pick(&MONTHS),
            rng.pick(&DAYS),
            duration.to_string().as_str(),
            campaign.to_string().as_str(),
            y,
        ])?;
    }
    writer.flush().context("flushing CSV")?;

    println!("Wrote {ROWS} rows ({accepted} accepted offers) to {output_path}");
    Ok(())
}
