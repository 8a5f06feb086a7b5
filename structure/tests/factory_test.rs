//! End-to-end construction through the public API.

use structure::{
    validate_atom_list, CrystalSpec, FreeformSpec, LatticeParameters, Rattle, StructureFactory,
    StructureSpec,
};

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

fn fept(space_group: i32) -> CrystalSpec {
    CrystalSpec {
        species: validate_atom_list("Fe, Pt").unwrap(),
        basis: vec![[0.0, 0.0, 0.0], [0.5, 0.5, 0.5]],
        parameters: LatticeParameters::new(3.85, 3.85, 3.72, 90.0, 90.0, 90.0),
        space_group,
    }
}

#[test]
fn test_fept_tetragonal_cell() {
    let factory = StructureFactory::new();
    let state = factory
        .build(&StructureSpec::Crystal(fept(123)), None)
        .unwrap();

    assert_eq!(state.len(), 2);
    assert_eq!(state.symbols(), ["Fe", "Pt"]);
    let params = state.cell_parameters();
    assert!(close(params.a, 3.85) && close(params.b, 3.85) && close(params.c, 3.72));
    assert!(close(params.alpha, 90.0) && close(params.beta, 90.0) && close(params.gamma, 90.0));
    assert!(!state.has_calculator());
}

#[test]
fn test_face_centred_copper() {
    let spec = CrystalSpec {
        species: vec!["Cu".to_string()],
        basis: vec![[0.0, 0.0, 0.0]],
        parameters: LatticeParameters::orthogonal(3.61, 3.61, 3.61),
        space_group: 225,
    };
    let state = StructureFactory::new().build_crystal(&spec).unwrap();
    assert_eq!(state.len(), 4);
}

#[test]
fn test_body_centred_iron() {
    let spec = CrystalSpec {
        species: vec!["Fe".to_string()],
        basis: vec![[0.0, 0.0, 0.0]],
        parameters: LatticeParameters::orthogonal(2.87, 2.87, 2.87),
        space_group: 229,
    };
    let state = StructureFactory::new()
        .build(&StructureSpec::Crystal(spec), None)
        .unwrap();
    assert_eq!(state.len(), 2);
    let centre = state.positions()[1];
    assert!(close(centre.x, 1.435) && close(centre.y, 1.435) && close(centre.z, 1.435));
}

#[test]
fn test_rock_salt_from_two_sites() {
    let spec = CrystalSpec {
        species: validate_atom_list("Na, Cl").unwrap(),
        basis: vec![[0.0, 0.0, 0.0], [0.5, 0.5, 0.5]],
        parameters: LatticeParameters::orthogonal(5.64, 5.64, 5.64),
        space_group: 225,
    };
    let state = StructureFactory::new().build_crystal(&spec).unwrap();
    assert_eq!(state.len(), 8);
    assert_eq!(state.symbols().iter().filter(|s| *s == "Na").count(), 4);
}

#[test]
fn test_body_centring_puts_two_species_on_one_site() {
    // Im-3m maps (0,0,0) onto (1/2,1/2,1/2), where Pt already sits.
    let err = StructureFactory::new().build_crystal(&fept(229)).unwrap_err();
    assert!(matches!(
        err,
        structure::ConstructionError::ConflictingSites { .. }
    ));
}

#[test]
fn test_counts_always_match_inputs() {
    let factory = StructureFactory::new();
    for n in 1..6 {
        let spec = FreeformSpec {
            species: vec!["Ar".to_string(); n],
            positions: (0..n).map(|i| [i as f64, 0.0, 0.0]).collect(),
            lengths: [10.0, 10.0, 10.0],
            pbc: [false; 3],
        };
        let state = factory.build(&StructureSpec::Freeform(spec), None).unwrap();
        assert_eq!(state.len(), n);
        assert_eq!(state.positions().len(), n);
    }
}

#[test]
fn test_mismatched_counts_never_build() {
    let mut spec = fept(123);
    spec.basis.pop();
    let result = StructureFactory::new().build(&StructureSpec::Crystal(spec), None);
    assert!(matches!(
        result,
        Err(structure::ConstructionError::SpeciesBasisMismatch {
            species: 2,
            positions: 1
        })
    ));
}

#[test]
fn test_rattled_crystal_moves_every_atom() {
    let factory = StructureFactory::new();
    let spec = StructureSpec::Crystal(fept(123));
    let plain = factory.build(&spec, None).unwrap();
    let rattled = factory
        .build(&spec, Some(&Rattle::new(0.01, None).unwrap()))
        .unwrap();
    for (a, b) in plain.positions().iter().zip(rattled.positions()) {
        assert_ne!(a, b);
    }

    let unrattled = factory
        .build(&spec, Some(&Rattle::new(0.0, None).unwrap()))
        .unwrap();
    assert_eq!(plain.positions(), unrattled.positions());
}
