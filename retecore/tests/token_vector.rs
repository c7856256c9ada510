use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use retecore::{
    Engine,
    base::{
        token::{Token, TokenTag},
        value::Value,
    },
    network::memory::TokenVector,
};

fn pool(engine: &Engine, size: i32) -> Vec<Token> {
    engine.templates().define("item", None, &["v"]).unwrap();
    (0..size)
        .map(|i| {
            let fact = engine.make_fact("item", vec![Value::Integer(i)]).unwrap();
            Token::new(Arc::new(fact), TokenTag::Normal)
        })
        .collect()
}

#[test]
fn swap_remove_matches_a_model() {
    let engine = Engine::default();
    let tokens = pool(&engine, 16);
    let mut rng = ChaCha20Rng::seed_from_u64(0x5eed);
    let mut vector = TokenVector::with_capacity(4);
    let mut model: Vec<Token> = Vec::new();

    for _ in 0..2_000 {
        match rng.random_range(0..10) {
            0..=4 => {
                let token = tokens[rng.random_range(0..tokens.len())].clone();
                vector.push(token.clone());
                model.push(token);
            }
            5..=7 => {
                // Retract through a fresh, data-equal token.
                let target = &tokens[rng.random_range(0..tokens.len())];
                let probe = Token::new(target.lead().unwrap().clone(), TokenTag::Retract);
                let expected = model
                    .iter()
                    .position(|t| t == &probe)
                    .map(|i| model.swap_remove(i));
                assert_eq!(vector.remove(&probe), expected);
            }
            8 => {
                let index = rng.random_range(0..=model.len());
                let expected = (index < model.len()).then(|| model.swap_remove(index));
                assert_eq!(vector.remove_at(index), expected);
            }
            _ => {
                if rng.random_bool(0.1) {
                    vector.clear();
                    model.clear();
                }
            }
        }
        assert_eq!(vector.as_slice(), model.as_slice());
    }
}
