//! Structure Factory: crystal (space group) and freeform (orthogonal box)
//! construction, plus the optional one-time rattle.

use crate::error::{ConstructionError, InputError};
use crate::lattice::{Lattice, LatticeParameters};
use crate::state::StructureState;
use crate::symmetry::{expand_asymmetric_unit, MoyoSpaceGroups, SpaceGroupSource};
use crate::validate::require_non_negative;
use nalgebra::Vector3;
use periodic_table_on_an_enum::Element;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Seed used when the user does not pick one.
pub const DEFAULT_RATTLE_SEED: u64 = 42;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuilderMode {
    Crystal,
    #[serde(alias = "atoms")]
    Freeform,
}

/// Asymmetric unit in fractional coordinates plus cell and space group.
#[derive(Debug, Clone, PartialEq)]
pub struct CrystalSpec {
    pub species: Vec<String>,
    pub basis: Vec<[f64; 3]>,
    pub parameters: LatticeParameters,
    pub space_group: i32,
}

/// Literal Cartesian positions inside an orthogonal box.
#[derive(Debug, Clone, PartialEq)]
pub struct FreeformSpec {
    pub species: Vec<String>,
    pub positions: Vec<[f64; 3]>,
    pub lengths: [f64; 3],
    pub pbc: [bool; 3],
}

#[derive(Debug, Clone, PartialEq)]
pub enum StructureSpec {
    Crystal(CrystalSpec),
    Freeform(FreeformSpec),
}

impl StructureSpec {
    pub fn mode(&self) -> BuilderMode {
        match self {
            StructureSpec::Crystal(_) => BuilderMode::Crystal,
            StructureSpec::Freeform(_) => BuilderMode::Freeform,
        }
    }

    pub fn species(&self) -> &[String] {
        match self {
            StructureSpec::Crystal(spec) => &spec.species,
            StructureSpec::Freeform(spec) => &spec.species,
        }
    }

    pub fn basis_len(&self) -> usize {
        match self {
            StructureSpec::Crystal(spec) => spec.basis.len(),
            StructureSpec::Freeform(spec) => spec.positions.len(),
        }
    }
}

/// Gaussian perturbation applied right after construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rattle {
    stdev: f64,
    seed: u64,
}

impl Rattle {
    pub fn new(stdev: f64, seed: Option<u64>) -> Result<Self, InputError> {
        require_non_negative("rattle standard deviation", stdev)?;
        Ok(Self {
            stdev,
            seed: seed.unwrap_or(DEFAULT_RATTLE_SEED),
        })
    }

    pub fn stdev(&self) -> f64 {
        self.stdev
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

pub struct StructureFactory<S: SpaceGroupSource = MoyoSpaceGroups> {
    space_groups: S,
}

impl StructureFactory<MoyoSpaceGroups> {
    pub fn new() -> Self {
        Self {
            space_groups: MoyoSpaceGroups,
        }
    }
}

impl Default for StructureFactory<MoyoSpaceGroups> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: SpaceGroupSource> StructureFactory<S> {
    pub fn with_space_groups(space_groups: S) -> Self {
        Self { space_groups }
    }

    /// Build a fresh structure, rattled once if requested. The result has no
    /// evaluator attached.
    pub fn build(
        &self,
        spec: &StructureSpec,
        rattle: Option<&Rattle>,
    ) -> Result<StructureState, ConstructionError> {
        let mut structure = match spec {
            StructureSpec::Crystal(crystal) => self.build_crystal(crystal)?,
            StructureSpec::Freeform(freeform) => build_freeform(freeform)?,
        };

        if let Some(rattle) = rattle {
            if rattle.stdev() > 0.0 {
                debug!(
                    "Rattling {} atoms with stdev {} (seed {})",
                    structure.len(),
                    rattle.stdev(),
                    rattle.seed()
                );
                let mut rng = StdRng::seed_from_u64(rattle.seed());
                structure.rattle(rattle.stdev(), &mut rng)?;
            }
        }

        info!(
            "Built {:?} structure with {} atoms",
            spec.mode(),
            structure.len()
        );
        Ok(structure)
    }

    pub fn build_crystal(&self, spec: &CrystalSpec) -> Result<StructureState, ConstructionError> {
        check_species(&spec.species, spec.basis.len())?;
        for (atom, coords) in spec.basis.iter().enumerate() {
            if let Some(&value) = coords.iter().find(|x| !(-1.0..=1.0).contains(*x)) {
                return Err(ConstructionError::CoordinateOutOfRange {
                    atom: atom + 1,
                    value,
                });
            }
        }

        let lattice = Lattice::from_parameters(&spec.parameters)?;
        let operations = self.space_groups.operations(spec.space_group)?;
        let basis: Vec<Vector3<f64>> = spec.basis.iter().map(|&c| Vector3::from(c)).collect();
        let (symbols, sites) = expand_asymmetric_unit(&spec.species, &basis, &operations)?;
        debug!(
            "Space group {} expanded {} basis sites into {} atoms",
            spec.space_group,
            basis.len(),
            sites.len()
        );

        let positions = sites.iter().map(|f| lattice.to_cartesian(f)).collect();
        StructureState::new(symbols, positions, lattice, [true; 3])
    }
}

pub fn build_freeform(spec: &FreeformSpec) -> Result<StructureState, ConstructionError> {
    check_species(&spec.species, spec.positions.len())?;
    let [a, b, c] = spec.lengths;
    let lattice = Lattice::orthorhombic(a, b, c)?;
    let positions = spec.positions.iter().map(|&p| Vector3::from(p)).collect();
    StructureState::new(spec.species.clone(), positions, lattice, spec.pbc)
}

fn check_species(species: &[String], basis_len: usize) -> Result<(), ConstructionError> {
    if species.is_empty() {
        return Err(ConstructionError::EmptyStructure);
    }
    if species.len() != basis_len {
        return Err(ConstructionError::SpeciesBasisMismatch {
            species: species.len(),
            positions: basis_len,
        });
    }
    if let Some(unknown) = species.iter().find(|s| Element::from_symbol(s).is_none()) {
        return Err(ConstructionError::UnknownElement(unknown.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symmetry::SymmetryOperation;

    struct IdentityOnly;

    impl SpaceGroupSource for IdentityOnly {
        fn operations(&self, number: i32) -> Result<Vec<SymmetryOperation>, ConstructionError> {
            if number == 1 {
                Ok(vec![SymmetryOperation::identity()])
            } else {
                Err(ConstructionError::InvalidSpaceGroup {
                    number,
                    reason: "only P1 here".to_string(),
                })
            }
        }
    }

    fn freeform(species: &[&str], positions: Vec<[f64; 3]>) -> FreeformSpec {
        FreeformSpec {
            species: species.iter().map(|s| s.to_string()).collect(),
            positions,
            lengths: [5.0, 5.0, 5.0],
            pbc: [true, true, false],
        }
    }

    #[test]
    fn test_freeform_keeps_literal_positions() {
        let spec = freeform(&["H", "H"], vec![[0.0, 0.0, 0.0], [0.0, 0.0, 0.74]]);
        let state = build_freeform(&spec).unwrap();
        assert_eq!(state.len(), 2);
        assert_eq!(state.positions()[1], Vector3::new(0.0, 0.0, 0.74));
        assert_eq!(state.pbc(), [true, true, false]);
    }

    #[test]
    fn test_freeform_rejects_mismatch_and_degenerate_box() {
        let spec = freeform(&["H", "H"], vec![[0.0, 0.0, 0.0]]);
        assert!(matches!(
            build_freeform(&spec),
            Err(ConstructionError::SpeciesBasisMismatch {
                species: 2,
                positions: 1
            })
        ));

        let mut spec = freeform(&["H"], vec![[0.0, 0.0, 0.0]]);
        spec.lengths = [5.0, -1.0, 5.0];
        assert!(matches!(
            build_freeform(&spec),
            Err(ConstructionError::DegenerateCell(_))
        ));
    }

    #[test]
    fn test_unknown_element() {
        let spec = freeform(&["Xx"], vec![[0.0, 0.0, 0.0]]);
        assert_eq!(
            build_freeform(&spec).unwrap_err(),
            ConstructionError::UnknownElement("Xx".to_string())
        );
    }

    #[test]
    fn test_crystal_with_custom_source() {
        let factory = StructureFactory::with_space_groups(IdentityOnly);
        let spec = CrystalSpec {
            species: vec!["Na".to_string(), "Cl".to_string()],
            basis: vec![[0.0, 0.0, 0.0], [0.5, 0.5, 0.5]],
            parameters: LatticeParameters::orthogonal(4.0, 4.0, 4.0),
            space_group: 1,
        };
        let state = factory.build_crystal(&spec).unwrap();
        assert_eq!(state.len(), 2);
        assert!((state.positions()[1] - Vector3::new(2.0, 2.0, 2.0)).norm() < 1e-12);

        let bad = CrystalSpec {
            space_group: 2,
            ..spec
        };
        assert!(matches!(
            factory.build_crystal(&bad),
            Err(ConstructionError::InvalidSpaceGroup { number: 2, .. })
        ));
    }

    #[test]
    fn test_crystal_coordinates_must_be_fractional() {
        let factory = StructureFactory::with_space_groups(IdentityOnly);
        let spec = CrystalSpec {
            species: vec!["Cu".to_string()],
            basis: vec![[0.0, 1.5, 0.0]],
            parameters: LatticeParameters::orthogonal(3.6, 3.6, 3.6),
            space_group: 1,
        };
        assert_eq!(
            factory.build_crystal(&spec).unwrap_err(),
            ConstructionError::CoordinateOutOfRange { atom: 1, value: 1.5 }
        );
    }

    #[test]
    fn test_seeded_rattle_is_reproducible() {
        let spec = StructureSpec::Freeform(freeform(
            &["Fe", "Pt"],
            vec![[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]],
        ));
        let rattle = Rattle::new(0.05, None).unwrap();
        let factory = StructureFactory::new();
        let first = factory.build(&spec, Some(&rattle)).unwrap();
        let second = factory.build(&spec, Some(&rattle)).unwrap();
        assert_eq!(first.positions(), second.positions());
        assert_ne!(first.positions()[0], Vector3::zeros());
    }

    #[test]
    fn test_rattle_width_must_be_non_negative() {
        assert!(Rattle::new(-0.01, None).is_err());
        assert_eq!(Rattle::new(0.0, Some(3)).unwrap().seed(), 3);
    }
}
