use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    angle_tune::apps::init_tracing();
    angle_tune::apps::run_eval(std::env::args().skip(1))
}
