//! Basic usage example for hangul-morph
//!
//! Run with: cargo run --example basic -- path/to/model.bin "문장"

use hangul_morph::{AnalyzeOption, Analyzer, BuildOption};
use std::env;
use std::fs::File;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: cargo run --example basic -- <model.bin> [text]");
        eprintln!();
        eprintln!("Example:");
        eprintln!("  cargo run --example basic -- model.bin \"한국어를 분석합니다\"");
        std::process::exit(1);
    }

    let model_path = &args[1];
    let text = args.get(2).map(String::as_str).unwrap_or("한국어 형태소 분석기 예제입니다");

    println!("Loading model from: {model_path}");
    let file = File::open(model_path)?;
    let analyzer = Analyzer::new(file, 4, BuildOption::default())?;

    println!();
    println!("Input: {text:?}");

    let option = AnalyzeOption::default();
    let results = analyzer.analyze(text, &option)?;

    let Some(best) = results.first() else {
        println!("No analysis found.");
        return Ok(());
    };

    println!("Score: {:.3}", best.score);
    for token in &best.tokens {
        println!("  {:>10} / {:<8?} pos={:<3} len={:<2} sent={}", token.form, token.tag, token.position, token.length, token.sent_position);
    }

    let sentences = analyzer.split_into_sentences(text, &option)?;
    println!();
    println!("Sentence spans: {sentences:?}");

    Ok(())
}
