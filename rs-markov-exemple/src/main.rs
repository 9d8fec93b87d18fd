use rs_markov_core::model::chain::Seed;
use rs_markov_core::model::markov_model::MarkovModel;

const CORPUS: &str = "the cat sat on the mat. the dog sat on the rug. \
                      the cat saw the dog by the mat. the dog saw the cat.";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Emit the library's structured logs to stderr
    tracing_subscriber::fmt()
        .with_env_filter("rs_markov_core=debug")
        .init();

    // Character-level model: states of 1 to 3 characters
    // Sentences end at '.', so generated chains stop there too
    let mut model = MarkovModel::new("exemple", 1, 3, Some('.'))?;
    model.set_source_text(CORPUS)?;
    model.build()?;

    println!(
        "{} distinct states, {} registrations",
        model.state_count(),
        model.total_registrations()
    );

    // 'Uniform' draws the starting state among all distinct states
    // 'Weighted' draws a source offset first, favoring frequent states
    // 'State' starts from an exact state value
    for i in 0..5 {
        println!("uniform {}: {:?}", i + 1, model.get_chain_as_string(40, Seed::Uniform)?);
    }
    for i in 0..5 {
        println!("weighted {}: {:?}", i + 1, model.get_chain_as_string(40, Seed::Weighted)?);
    }

    let seed = ['t', 'h', 'e'];
    println!("seeded: {:?}", model.get_chain_as_string(40, Seed::State(&seed))?);

    // Seeding with a state that was never registered is an error
    let unknown = ['z', 'z'];
    match model.get_chain(10, Seed::State(&unknown)) {
        Ok(_) => println!("Should not happen"),
        Err(e) => println!("Seeding with \"zz\" fails: {e}"),
    }

    // The source is assigned once for the life of the model
    match model.set_source_text("other text") {
        Ok(_) => println!("Should not happen"),
        Err(e) => println!("Re-assigning the source fails: {e}"),
    }

    // Round-trip the model through a compressed document file
    let dir = tempfile::tempdir()?;
    let path = model.save(Some(dir.path()), false, true)?;
    println!("saved to {}", path.display());

    let mut reloaded: MarkovModel<char> = MarkovModel::new("exemple", 1, 3, Some('.'))?;
    reloaded.load(Some(&path))?;
    println!("reloaded {} states", reloaded.state_count());
    println!("from reload: {:?}", reloaded.get_chain_as_string(40, Seed::Uniform)?);

    Ok(())
}
