use crate::relax_impl::RelaxationRequest;
use md::TrajectoryResult;
use structure::{CalculatorError, LatticeParameters, StructureState};
use tracing::info;

/// Numbers shown for every finished structure.
#[derive(Debug, Clone, PartialEq)]
pub struct EnergySummary {
    pub energy: f64,
    pub energy_per_atom: f64,
    pub n_atoms: usize,
    pub max_force: f64,
    pub parameters: LatticeParameters,
}

pub fn summarize(structure: &StructureState) -> Result<EnergySummary, CalculatorError> {
    let evaluation = structure.evaluate()?;
    let n_atoms = structure.len();
    Ok(EnergySummary {
        energy: evaluation.energy,
        energy_per_atom: evaluation.energy / n_atoms.max(1) as f64,
        n_atoms,
        max_force: evaluation.max_force(),
        parameters: structure.cell_parameters(),
    })
}

pub fn report_energy(stage: &str, structure: &StructureState, summary: &EnergySummary) {
    let p = &summary.parameters;
    info!("\nCalculated energy ({} structure):", stage);
    info!("  Energy:      {:.4} eV", summary.energy);
    info!("  Energy/atom: {:.4} eV/atom", summary.energy_per_atom);
    info!("  Max force:   {:.4} eV/A", summary.max_force);
    info!("\nLattice constants:");
    info!("  a = {:.4} A, b = {:.4} A, c = {:.4} A", p.a, p.b, p.c);
    info!(
        "  alpha = {:.4} deg, beta = {:.4} deg, gamma = {:.4} deg",
        p.alpha, p.beta, p.gamma
    );

    info!("\nPositions ({} atoms, Cartesian A | fractional):", summary.n_atoms);
    for (idx, ((symbol, position), fractional)) in structure
        .symbols()
        .iter()
        .zip(structure.positions())
        .zip(structure.fractional_positions())
        .enumerate()
    {
        info!(
            "  Atom {:>3} {:>2}: [{:+.6}, {:+.6}, {:+.6}] | [{:.4}, {:.4}, {:.4}]",
            idx + 1,
            symbol,
            position.x,
            position.y,
            position.z,
            fractional.x,
            fractional.y,
            fractional.z
        );
    }
}

pub fn report_relaxation(request: &RelaxationRequest) {
    let settings = request.settings();
    info!("\nRelaxation completed with:");
    info!("  Optimizer:            {}", settings.optimizer);
    info!("  Relaxation steps:     {}", request.steps());
    info!(
        "  Filter:               {}",
        settings.filter.map_or("None", |f| f.token())
    );
    info!("  Maximum force:        {}", request.fmax());
    info!("  Symmetry constrained: {}", settings.constrain_symmetry);
    info!("  Pressure in eV/A^3:   {:.5}", request.pressure());
    info!("  Pressure in GPa:      {:.5}", request.pressure_gpa());
}

pub fn report_md(trajectory: &TrajectoryResult) {
    let request = trajectory.request();
    info!("\nMD simulation completed with:");
    info!("  Ensemble:          {}", request.ensemble());
    info!("  Temperature (K):   {:.5}", request.temperature_k());
    info!("  Temperature (deg): {:.5}", request.temperature_celsius());
    info!("  Time step:         {} fs", request.timestep_fs());
    info!("  Taut:              {} fs", request.thermostat_timescale());
    info!("  Steps:             {}", request.n_steps());
    if let Some(temperature) = trajectory.final_temperature() {
        info!("  Final temperature: {:.2} K", temperature);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;
    use std::sync::Arc;
    use structure::{Calculator, CalculatorInfo, CollaboratorError, Evaluation, Lattice};

    #[derive(Debug)]
    struct Flat(CalculatorInfo);

    impl Calculator for Flat {
        fn info(&self) -> &CalculatorInfo {
            &self.0
        }

        fn evaluate(&self, structure: &StructureState) -> Result<Evaluation, CollaboratorError> {
            Ok(Evaluation {
                energy: -2.5 * structure.len() as f64,
                forces: structure.positions().iter().map(|p| -p).collect(),
                stress: None,
            })
        }
    }

    fn pair() -> StructureState {
        StructureState::new(
            vec!["Fe".to_string(), "Pt".to_string()],
            vec![Vector3::zeros(), Vector3::new(1.925, 1.925, 1.86)],
            Lattice::orthorhombic(3.85, 3.85, 3.72).unwrap(),
            [true; 3],
        )
        .unwrap()
    }

    #[test]
    fn test_summary_per_atom() {
        let mut structure = pair();
        structure.attach_calculator(Arc::new(Flat(CalculatorInfo {
            model: "1M".to_string(),
            checkpoint: "MatterSim-v1.0.0-1M.pth".to_string(),
            device: "cpu".to_string(),
            map_location: Some("cpu".to_string()),
        })));

        let summary = summarize(&structure).unwrap();
        assert_eq!(summary.energy, -5.0);
        assert_eq!(summary.energy_per_atom, -2.5);
        assert_eq!(summary.n_atoms, 2);
        let expected = Vector3::<f64>::new(1.925, 1.925, 1.86).norm();
        assert!((summary.max_force - expected).abs() < 1e-12);
        assert!((summary.parameters.c - 3.72).abs() < 1e-12);
        assert!((summary.parameters.gamma - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_summary_needs_an_evaluator() {
        assert_eq!(
            summarize(&pair()).unwrap_err(),
            CalculatorError::NotAttached
        );
    }
}
