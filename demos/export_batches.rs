use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    neighbor_curator::apps::run_export_batches(std::env::args().skip(1))
}
