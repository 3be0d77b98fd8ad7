//! Drives a set of moves over a model graph and runs independent replicates.
use super::error::McmcError;
use super::mh::{MetropolisHastingsMove, MoveSummary};
use crate::config::ChainConfig;
use crate::graph::ModelGraph;
use crate::moves::random::uniform01;
use log::info;
use rand_pcg::Pcg64;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub iteration: usize,
    pub ln_posterior: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainReport {
    pub replicate: usize,
    pub iterations: usize,
    pub samples: Vec<Sample>,
    pub moves: Vec<MoveSummary>,
}

/// One single-threaded Markov chain.
#[derive(Debug, Clone)]
pub struct Chain {
    graph: ModelGraph,
    moves: Vec<MetropolisHastingsMove>,
    config: ChainConfig,
    replicate: usize,
    rng: Pcg64,
    total_weight: f64,
}

impl Chain {
    /// Every replicate draws from its own PCG stream, selected by the replicate index.
    pub fn new(
        graph: ModelGraph,
        moves: Vec<MetropolisHastingsMove>,
        config: &ChainConfig,
        replicate: usize,
    ) -> Result<Self, McmcError> {
        config.validate()?;
        for mv in &moves {
            if !(mv.weight().is_finite() && mv.weight() >= 0.0) {
                return Err(McmcError::InvalidWeight { name: mv.name().to_string(), weight: mv.weight() });
            }
        }
        let total_weight: f64 = moves.iter().map(|m| m.weight()).sum();
        if total_weight <= 0.0 {
            return Err(McmcError::NoMoves);
        }
        let rng = Pcg64::new(config.seed as u128, replicate as u128);
        Ok(Self { graph, moves, config: config.clone(), replicate, rng, total_weight })
    }

    pub fn graph(&self) -> &ModelGraph { &self.graph }
    pub fn into_graph(self) -> ModelGraph { self.graph }
    pub fn moves(&self) -> &[MetropolisHastingsMove] { &self.moves }

    fn pick_move(&mut self) -> usize {
        let target = uniform01(&mut self.rng) * self.total_weight;
        let mut cumulative = 0.0;
        let mut last = 0;
        for (i, mv) in self.moves.iter().enumerate() {
            if mv.weight() > 0.0 {
                cumulative += mv.weight();
                last = i;
                if target < cumulative {
                    return i;
                }
            }
        }
        last
    }

    pub fn run(&mut self) -> Result<ChainReport, McmcError> {
        info!("replicate {}: running {} iterations", self.replicate, self.config.iterations);
        let mut samples = Vec::with_capacity(self.config.iterations / self.config.sample_every + 1);

        for iteration in 1..=self.config.iterations {
            let index = self.pick_move();
            self.moves[index].perform(&mut self.graph, &mut self.rng, self.config.heat)?;

            if self.config.tunes_at(iteration) {
                for mv in &mut self.moves {
                    mv.auto_tune();
                }
            }
            if iteration % self.config.sample_every == 0 {
                samples.push(Sample { iteration, ln_posterior: self.graph.ln_posterior()? });
            }
        }

        let moves: Vec<MoveSummary> = self.moves.iter().map(|m| m.summary()).collect();
        info!(
            "replicate {}: done, {} of {} proposals accepted",
            self.replicate,
            moves.iter().map(|m| m.accepted).sum::<u64>(),
            moves.iter().map(|m| m.tried).sum::<u64>()
        );
        Ok(ChainReport { replicate: self.replicate, iterations: self.config.iterations, samples, moves })
    }
}

/// Builds and runs `config.replicates` independent chains in parallel.
///
/// `build` is called once per replicate and must return a fresh graph and move set.
pub fn run_replicates<F>(config: &ChainConfig, build: F) -> Result<Vec<ChainReport>, McmcError>
where
    F: Fn(usize) -> Result<(ModelGraph, Vec<MetropolisHastingsMove>), McmcError> + Sync,
{
    config.validate()?;
    (0..config.replicates)
        .into_par_iter()
        .map(|replicate| {
            let (graph, moves) = build(replicate)?;
            Chain::new(graph, moves, config, replicate)?.run()
        })
        .collect()
}
