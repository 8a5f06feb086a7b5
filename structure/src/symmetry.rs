//! Space-group operations and expansion of an asymmetric unit.
//!
//! Generating the operations of a space group is delegated to a
//! [`SpaceGroupSource`]; the default one reads moyo's Hall-symbol database.

use crate::error::ConstructionError;
use moyo::data::{hall_symbol_entry, HallSymbol};
use nalgebra::{Matrix3, Vector3};

/// Largest Hall number in the international tables database.
const MAX_HALL_NUMBER: i32 = 530;

/// Sites closer than this (fractional units) are the same site.
pub const SITE_TOLERANCE: f64 = 1e-3;

#[derive(Debug, Clone, PartialEq)]
pub struct SymmetryOperation {
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
}

impl SymmetryOperation {
    pub fn identity() -> Self {
        Self {
            rotation: Matrix3::identity(),
            translation: Vector3::zeros(),
        }
    }

    pub fn apply(&self, fractional: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * fractional + self.translation
    }
}

pub trait SpaceGroupSource {
    /// Operations of the conventional cell of space group `number`.
    fn operations(&self, number: i32) -> Result<Vec<SymmetryOperation>, ConstructionError>;
}

/// Space groups from moyo, first setting of each number (origin choice 1,
/// hexagonal axes for rhombohedral groups).
#[derive(Debug, Clone, Copy, Default)]
pub struct MoyoSpaceGroups;

impl SpaceGroupSource for MoyoSpaceGroups {
    fn operations(&self, number: i32) -> Result<Vec<SymmetryOperation>, ConstructionError> {
        if !(1..=230).contains(&number) {
            return Err(ConstructionError::InvalidSpaceGroup {
                number,
                reason: "space group numbers run from 1 to 230".to_string(),
            });
        }

        let entry = (1..=MAX_HALL_NUMBER)
            .filter_map(hall_symbol_entry)
            .find(|entry| entry.number == number)
            .ok_or_else(|| ConstructionError::InvalidSpaceGroup {
                number,
                reason: "no Hall symbol registered".to_string(),
            })?;

        let hall_symbol =
            HallSymbol::new(entry.hall_symbol).ok_or_else(|| ConstructionError::InvalidSpaceGroup {
                number,
                reason: format!("cannot parse Hall symbol '{}'", entry.hall_symbol),
            })?;

        // traverse() is modulo the centring vectors, which moyo keeps apart
        // (without the zero vector).
        let centrings: Vec<Vector3<f64>> = std::iter::once(Vector3::zeros())
            .chain(hall_symbol.centering_translations.iter().copied())
            .collect();

        let operations = hall_symbol
            .traverse()
            .iter()
            .flat_map(|op| {
                let rotation = Matrix3::from_fn(|i, j| op.rotation[(i, j)] as f64);
                let translation =
                    Vector3::new(op.translation[0], op.translation[1], op.translation[2]);
                centrings.iter().map(move |centring| SymmetryOperation {
                    rotation,
                    translation: translation + centring,
                })
            })
            .collect();
        Ok(operations)
    }
}

/// Wrap a fractional coordinate into [0, 1).
pub fn wrap_fractional(fractional: &Vector3<f64>) -> Vector3<f64> {
    fractional.map(|x| {
        let wrapped = x - x.floor();
        if (1.0 - wrapped) < SITE_TOLERANCE * 1e-3 {
            0.0
        } else {
            wrapped
        }
    })
}

fn same_site(a: &Vector3<f64>, b: &Vector3<f64>) -> bool {
    let d = (a - b).map(|x| x - x.round());
    d.norm() < SITE_TOLERANCE
}

/// Apply every operation to every basis site, keep unique images.
///
/// Images of the same species that coincide are merged. Two different species
/// on one site is an error.
pub fn expand_asymmetric_unit(
    symbols: &[String],
    basis: &[Vector3<f64>],
    operations: &[SymmetryOperation],
) -> Result<(Vec<String>, Vec<Vector3<f64>>), ConstructionError> {
    let mut out_symbols: Vec<String> = Vec::new();
    let mut out_sites: Vec<Vector3<f64>> = Vec::new();

    for (symbol, site) in symbols.iter().zip(basis) {
        for op in operations {
            let image = wrap_fractional(&op.apply(site));
            match out_sites.iter().position(|existing| same_site(existing, &image)) {
                Some(index) if out_symbols[index] == *symbol => {}
                Some(index) => {
                    return Err(ConstructionError::ConflictingSites {
                        first: out_symbols[index].clone(),
                        second: symbol.clone(),
                        site: [image.x, image.y, image.z],
                    });
                }
                None => {
                    out_symbols.push(symbol.clone());
                    out_sites.push(image);
                }
            }
        }
    }

    Ok((out_symbols, out_sites))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inversion() -> SymmetryOperation {
        SymmetryOperation {
            rotation: -Matrix3::identity(),
            translation: Vector3::zeros(),
        }
    }

    fn body_centering() -> SymmetryOperation {
        SymmetryOperation {
            rotation: Matrix3::identity(),
            translation: Vector3::new(0.5, 0.5, 0.5),
        }
    }

    #[test]
    fn test_wrap_into_unit_cell() {
        let wrapped = wrap_fractional(&Vector3::new(-0.25, 1.5, 1.0));
        assert!((wrapped - Vector3::new(0.75, 0.5, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_special_positions_merge() {
        let ops = vec![SymmetryOperation::identity(), inversion()];
        let (symbols, sites) = expand_asymmetric_unit(
            &["Fe".to_string()],
            &[Vector3::new(0.5, 0.5, 0.5)],
            &ops,
        )
        .unwrap();
        assert_eq!(symbols.len(), 1);
        assert_eq!(sites.len(), 1);
    }

    #[test]
    fn test_general_positions_multiply() {
        let ops = vec![SymmetryOperation::identity(), inversion()];
        let (_, sites) = expand_asymmetric_unit(
            &["O".to_string()],
            &[Vector3::new(0.1, 0.2, 0.3)],
            &ops,
        )
        .unwrap();
        assert_eq!(sites.len(), 2);
        assert!((sites[1] - Vector3::new(0.9, 0.8, 0.7)).norm() < 1e-12);
    }

    #[test]
    fn test_conflicting_species_on_one_site() {
        let ops = vec![SymmetryOperation::identity(), body_centering()];
        let err = expand_asymmetric_unit(
            &["Fe".to_string(), "Pt".to_string()],
            &[Vector3::zeros(), Vector3::new(0.5, 0.5, 0.5)],
            &ops,
        )
        .unwrap_err();
        assert!(matches!(err, ConstructionError::ConflictingSites { .. }));
    }

    #[test]
    fn test_space_group_range_is_checked() {
        assert!(matches!(
            MoyoSpaceGroups.operations(0),
            Err(ConstructionError::InvalidSpaceGroup { number: 0, .. })
        ));
        assert!(matches!(
            MoyoSpaceGroups.operations(231),
            Err(ConstructionError::InvalidSpaceGroup { number: 231, .. })
        ));
    }

    #[test]
    fn test_moyo_operation_counts() {
        assert_eq!(MoyoSpaceGroups.operations(1).unwrap().len(), 1);
        assert_eq!(MoyoSpaceGroups.operations(123).unwrap().len(), 16);
        // Fm-3m: 48 point operations times 4 centering translations
        assert_eq!(MoyoSpaceGroups.operations(225).unwrap().len(), 192);
        assert_eq!(MoyoSpaceGroups.operations(229).unwrap().len(), 96);
        // R-3m on hexagonal axes
        assert_eq!(MoyoSpaceGroups.operations(166).unwrap().len(), 36);
    }

    #[test]
    fn test_centring_translations_are_included() {
        let ops = MoyoSpaceGroups.operations(229).unwrap();
        let centring = Vector3::new(0.5, 0.5, 0.5);
        assert!(ops
            .iter()
            .any(|op| op.rotation == Matrix3::identity() && (op.translation - centring).norm() < 1e-12));
    }
}
