use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    neighbor_curator::apps::run_import_annotations(std::env::args().skip(1))
}
