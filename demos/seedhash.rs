//! Print seed hashes and sizes for a range of epochs, for cross-checking
//! against other Ethash implementations.

use ethash_engine::{EpochParams, SeedHasher};

fn main() {
    // a poor man cli parser.
    let mut args = std::env::args().skip(1);

    let from: u64 = args
        .next()
        .map(|v| v.parse().unwrap_or_else(|_| print_help()))
        .unwrap_or_else(|| print_help());
    let to: u64 = args
        .next()
        .map(|v| v.parse().unwrap_or_else(|_| print_help()))
        .unwrap_or_else(|| print_help());

    let params = EpochParams::default();
    let seeds = SeedHasher::new();
    println!("epoch,block,seed,cache_size,full_size");
    for epoch in from..to {
        let number = epoch.saturating_mul(params.epoch_length);
        match params.checked_epoch(number) {
            Ok(epoch) => println!(
                "{},{},{:x},{},{}",
                epoch,
                number,
                seeds.seed(epoch),
                params.cache_size(epoch),
                params.full_size(epoch)
            ),
            Err(err) => {
                eprintln!("{err}");
                std::process::exit(1);
            }
        }
    }
}

fn print_help() -> ! {
    println!("usage: seedhash <FROM_EPOCH> <TO_EPOCH>");
    std::process::exit(1);
}
