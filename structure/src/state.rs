use crate::calculator::{same_calculator, CalculatorHandle, Evaluation};
use crate::error::{CalculatorError, ConstructionError};
use crate::lattice::{Lattice, LatticeParameters};
use itertools::iproduct;
use nalgebra::Vector3;
use periodic_table_on_an_enum::Element;
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// An atomic configuration: ordered species with Cartesian positions (Å),
/// a periodic cell and an optional attached potential evaluator.
///
/// Relaxation and MD never mutate a state; they return a new one. The only
/// in-place change is [`StructureState::rattle`], applied once by the factory.
#[derive(Debug, Clone)]
pub struct StructureState {
    symbols: Vec<String>,
    positions: Vec<Vector3<f64>>,
    velocities: Option<Vec<Vector3<f64>>>,
    lattice: Lattice,
    pbc: [bool; 3],
    calculator: Option<CalculatorHandle>,
}

impl StructureState {
    pub fn new(
        symbols: Vec<String>,
        positions: Vec<Vector3<f64>>,
        lattice: Lattice,
        pbc: [bool; 3],
    ) -> Result<Self, ConstructionError> {
        if symbols.len() != positions.len() {
            return Err(ConstructionError::SpeciesBasisMismatch {
                species: symbols.len(),
                positions: positions.len(),
            });
        }
        Ok(Self {
            symbols,
            positions,
            velocities: None,
            lattice,
            pbc,
            calculator: None,
        })
    }

    /// Attach per-atom velocities (Å/fs).
    pub fn with_velocities(
        mut self,
        velocities: Vec<Vector3<f64>>,
    ) -> Result<Self, ConstructionError> {
        if velocities.len() != self.positions.len() {
            return Err(ConstructionError::VelocityCountMismatch {
                atoms: self.positions.len(),
                velocities: velocities.len(),
            });
        }
        self.velocities = Some(velocities);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn positions(&self) -> &[Vector3<f64>] {
        &self.positions
    }

    pub fn velocities(&self) -> Option<&[Vector3<f64>]> {
        self.velocities.as_deref()
    }

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    pub fn pbc(&self) -> [bool; 3] {
        self.pbc
    }

    /// Lattice lengths and angles (degrees) of the current cell.
    pub fn cell_parameters(&self) -> LatticeParameters {
        self.lattice.parameters()
    }

    pub fn fractional_positions(&self) -> Vec<Vector3<f64>> {
        self.positions
            .iter()
            .map(|p| self.lattice.to_fractional(p))
            .collect()
    }

    /// Standard atomic masses in amu, 0.0 for symbols outside the table.
    pub fn masses(&self) -> Vec<f64> {
        self.symbols
            .iter()
            .map(|symbol| {
                Element::from_symbol(symbol)
                    .map(|element| f64::from(element.get_atomic_mass()))
                    .unwrap_or(0.0)
            })
            .collect()
    }

    /// Displace every atom by an independent zero-mean Gaussian of width
    /// `stdev` Å. A zero width leaves positions untouched.
    pub fn rattle<R: Rng + ?Sized>(
        &mut self,
        stdev: f64,
        rng: &mut R,
    ) -> Result<(), ConstructionError> {
        if !stdev.is_finite() || stdev < 0.0 {
            return Err(ConstructionError::InvalidPerturbation(format!(
                "stdev must be a non-negative finite width, got {stdev}"
            )));
        }
        if stdev == 0.0 {
            return Ok(());
        }
        let normal = Normal::new(0.0, stdev)
            .map_err(|e| ConstructionError::InvalidPerturbation(format!("stdev {stdev}: {e}")))?;
        for position in &mut self.positions {
            for k in 0..3 {
                position[k] += normal.sample(rng);
            }
        }
        Ok(())
    }

    pub fn calculator(&self) -> Option<&CalculatorHandle> {
        self.calculator.as_ref()
    }

    pub fn has_calculator(&self) -> bool {
        self.calculator.is_some()
    }

    pub fn attach_calculator(&mut self, calculator: CalculatorHandle) {
        self.calculator = Some(calculator);
    }

    /// Carry `source`'s evaluator over to this state.
    pub fn with_calculator_from(mut self, source: &StructureState) -> Self {
        self.calculator = source.calculator.clone();
        self
    }

    pub fn shares_calculator_with(&self, other: &StructureState) -> bool {
        match (&self.calculator, &other.calculator) {
            (Some(a), Some(b)) => same_calculator(a, b),
            _ => false,
        }
    }

    pub fn evaluate(&self) -> Result<Evaluation, CalculatorError> {
        let calculator = self.calculator.as_ref().ok_or(CalculatorError::NotAttached)?;
        Ok(calculator.evaluate(self)?)
    }

    pub fn potential_energy(&self) -> Result<f64, CalculatorError> {
        Ok(self.evaluate()?.energy)
    }

    /// Tile the cell `n` times along each axis. The evaluator is not copied.
    pub fn repeat(&self, n: [usize; 3]) -> Result<StructureState, ConstructionError> {
        if n.iter().any(|&count| count == 0) {
            return Err(ConstructionError::DegenerateCell(format!(
                "repeat counts {n:?} must be positive"
            )));
        }
        let lattice = self.lattice.scaled(n)?;
        let (a, b, c) = (
            self.lattice.vector(0),
            self.lattice.vector(1),
            self.lattice.vector(2),
        );

        let copies = n[0] * n[1] * n[2];
        let mut symbols = Vec::with_capacity(self.len() * copies);
        let mut positions = Vec::with_capacity(self.len() * copies);
        for (i, j, k) in iproduct!(0..n[0], 0..n[1], 0..n[2]) {
            let shift = a * i as f64 + b * j as f64 + c * k as f64;
            for (symbol, position) in self.symbols.iter().zip(&self.positions) {
                symbols.push(symbol.clone());
                positions.push(position + shift);
            }
        }

        StructureState::new(symbols, positions, lattice, self.pbc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

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
    fn test_counts_must_match() {
        let err = StructureState::new(
            vec!["Fe".to_string()],
            vec![Vector3::zeros(), Vector3::zeros()],
            Lattice::orthorhombic(1.0, 1.0, 1.0).unwrap(),
            [true; 3],
        )
        .unwrap_err();
        assert_eq!(
            err,
            ConstructionError::SpeciesBasisMismatch {
                species: 1,
                positions: 2
            }
        );
    }

    #[test]
    fn test_zero_rattle_is_bit_identical() {
        let mut state = pair();
        let before: Vec<_> = state.positions().to_vec();
        state.rattle(0.0, &mut StdRng::seed_from_u64(7)).unwrap();
        for (a, b) in before.iter().zip(state.positions()) {
            for k in 0..3 {
                assert_eq!(a[k].to_bits(), b[k].to_bits());
            }
        }
    }

    #[test]
    fn test_rattle_moves_every_atom() {
        let mut state = pair();
        let before: Vec<_> = state.positions().to_vec();
        state.rattle(0.01, &mut StdRng::seed_from_u64(42)).unwrap();
        for (a, b) in before.iter().zip(state.positions()) {
            assert_ne!(a, b);
            assert!((a - b).norm() < 0.2);
        }
    }

    #[test]
    fn test_negative_rattle_width_is_rejected() {
        let mut state = pair();
        assert!(matches!(
            state.rattle(-0.1, &mut StdRng::seed_from_u64(1)),
            Err(ConstructionError::InvalidPerturbation(_))
        ));
        assert!(state.rattle(f64::NAN, &mut StdRng::seed_from_u64(1)).is_err());
        assert_eq!(state.positions(), pair().positions());
    }

    #[test]
    fn test_repeat_tiles_cell() {
        let state = pair();
        let supercell = state.repeat([2, 2, 1]).unwrap();
        assert_eq!(supercell.len(), 8);
        let params = supercell.cell_parameters();
        assert!((params.a - 7.7).abs() < 1e-9);
        assert!((params.c - 3.72).abs() < 1e-9);
        assert!(supercell.calculator().is_none());
        assert!(state.repeat([0, 1, 1]).is_err());
    }

    #[test]
    fn test_masses_follow_species() {
        let masses = pair().masses();
        assert!(masses[0] > 55.0 && masses[0] < 56.5);
        assert!(masses[1] > 195.0 && masses[1] < 195.5);
    }

    #[test]
    fn test_energy_requires_calculator() {
        assert_eq!(pair().potential_energy(), Err(CalculatorError::NotAttached));
    }
}
