//! JSON shapes exchanged with the worker.

use crate::relax_impl::{FilterParams, RawRelaxOutput, RelaxerSettings};
use md::Frame;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use structure::{CalculatorInfo, CollaboratorError, Evaluation, Lattice, StructureState};

/// A structure as ASE sees it: Cartesian positions and cell rows in Å.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomsPayload {
    pub symbols: Vec<String>,
    pub positions: Vec<[f64; 3]>,
    pub cell: [[f64; 3]; 3],
    pub pbc: [bool; 3],
    #[serde(default)]
    pub velocities: Option<Vec<[f64; 3]>>,
}

fn to_array(v: &Vector3<f64>) -> [f64; 3] {
    [v.x, v.y, v.z]
}

impl AtomsPayload {
    pub fn from_state(structure: &StructureState) -> Self {
        let lattice = structure.lattice();
        Self {
            symbols: structure.symbols().to_vec(),
            positions: structure.positions().iter().map(to_array).collect(),
            cell: [
                to_array(&lattice.vector(0)),
                to_array(&lattice.vector(1)),
                to_array(&lattice.vector(2)),
            ],
            pbc: structure.pbc(),
            velocities: structure
                .velocities()
                .map(|v| v.iter().map(to_array).collect()),
        }
    }

    /// Rebuild a structure; the evaluator is not part of the payload.
    pub fn into_state(self) -> Result<StructureState, CollaboratorError> {
        let invalid = |e: structure::ConstructionError| {
            CollaboratorError::new(format!("worker returned an invalid structure: {e}"))
        };
        let cell = self.cell;
        let lattice = Lattice::from_vectors(Matrix3::from_fn(|i, j| cell[i][j])).map_err(invalid)?;
        let positions = self.positions.into_iter().map(Vector3::from).collect();
        let state = StructureState::new(self.symbols, positions, lattice, self.pbc).map_err(invalid)?;
        match self.velocities {
            Some(velocities) => state
                .with_velocities(velocities.into_iter().map(Vector3::from).collect())
                .map_err(invalid),
            None => Ok(state),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoadRequest<'a> {
    pub calculator: &'a CalculatorInfo,
}

#[derive(Debug, Serialize)]
pub struct EvaluateRequest<'a> {
    pub calculator: &'a CalculatorInfo,
    pub atoms: AtomsPayload,
}

#[derive(Debug, Serialize)]
pub struct CheckRelaxerRequest<'a> {
    pub settings: &'a RelaxerSettings,
}

#[derive(Debug, Serialize)]
pub struct RelaxRequest<'a> {
    pub calculator: &'a CalculatorInfo,
    pub atoms: AtomsPayload,
    pub settings: &'a RelaxerSettings,
    pub steps: usize,
    pub fmax: f64,
    pub filter_params: &'a FilterParams,
}

#[derive(Debug, Serialize)]
pub struct MdRunRequest<'a> {
    pub calculator: &'a CalculatorInfo,
    pub atoms: &'a AtomsPayload,
    pub ensemble: &'static str,
    pub temperature: f64,
    pub timestep: f64,
    pub taut: f64,
    pub n_steps: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeReply {
    pub accelerator: bool,
    #[serde(default)]
    pub device_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EvaluateReply {
    pub energy: f64,
    pub forces: Vec<[f64; 3]>,
    #[serde(default)]
    pub stress: Option<[f64; 6]>,
}

impl From<EvaluateReply> for Evaluation {
    fn from(reply: EvaluateReply) -> Self {
        Evaluation {
            energy: reply.energy,
            forces: reply.forces.into_iter().map(Vector3::from).collect(),
            stress: reply.stress,
        }
    }
}

/// The relaxer's answer, tagged by the shape it came back in.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelaxReply {
    Structure {
        atoms: AtomsPayload,
    },
    Flagged {
        success: bool,
        #[serde(default)]
        atoms: Option<AtomsPayload>,
    },
    Unrecognized {
        type_name: String,
    },
}

impl RelaxReply {
    pub fn into_raw(self) -> Result<RawRelaxOutput, CollaboratorError> {
        Ok(match self {
            RelaxReply::Structure { atoms } => RawRelaxOutput::Structure(atoms.into_state()?),
            RelaxReply::Flagged { success, atoms } => RawRelaxOutput::Flagged {
                success,
                structure: atoms.map(AtomsPayload::into_state).transpose()?,
            },
            RelaxReply::Unrecognized { type_name } => RawRelaxOutput::Unrecognized(type_name),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MdReply {
    pub atoms: AtomsPayload,
    #[serde(default)]
    pub frames: Vec<Frame>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_keeps_geometry() {
        let state = StructureState::new(
            vec!["Fe".to_string()],
            vec![Vector3::new(0.5, 1.0, 1.5)],
            Lattice::orthorhombic(2.0, 3.0, 4.0).unwrap(),
            [true, true, false],
        )
        .unwrap();
        let payload = AtomsPayload::from_state(&state);
        assert_eq!(payload.cell[1], [0.0, 3.0, 0.0]);
        assert_eq!(payload.velocities, None);

        let back = payload.into_state().unwrap();
        assert_eq!(back.positions(), state.positions());
        assert_eq!(back.pbc(), [true, true, false]);
    }

    #[test]
    fn test_relax_reply_shapes() {
        let atoms = r#"{"symbols": ["Cu"], "positions": [[0, 0, 0]],
            "cell": [[3.6, 0, 0], [0, 3.6, 0], [0, 0, 3.6]], "pbc": [true, true, true]}"#;

        let reply: RelaxReply =
            serde_json::from_str(&format!(r#"{{"kind": "structure", "atoms": {atoms}}}"#)).unwrap();
        assert!(matches!(reply.into_raw().unwrap(), RawRelaxOutput::Structure(_)));

        let reply: RelaxReply =
            serde_json::from_str(r#"{"kind": "flagged", "success": false}"#).unwrap();
        assert!(matches!(
            reply.into_raw().unwrap(),
            RawRelaxOutput::Flagged {
                success: false,
                structure: None
            }
        ));

        let reply: RelaxReply =
            serde_json::from_str(r#"{"kind": "unrecognized", "type_name": "dict"}"#).unwrap();
        assert!(matches!(
            reply.into_raw().unwrap(),
            RawRelaxOutput::Unrecognized(name) if name == "dict"
        ));
    }

    #[test]
    fn test_degenerate_cell_from_worker_is_rejected() {
        let payload = AtomsPayload {
            symbols: vec!["Cu".to_string()],
            positions: vec![[0.0; 3]],
            cell: [[0.0; 3]; 3],
            pbc: [false; 3],
            velocities: None,
        };
        assert!(payload.into_state().is_err());
    }
}
