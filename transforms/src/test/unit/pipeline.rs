use enumset::enum_set;

use tessera_dtype::DataType;
use tessera_ir::structural_equal;

use crate::error::Error;
use crate::pass::create_function_pass;
use crate::passes::{convert_tensor_to_block_ops, identity};
use crate::pipeline::{PassPipeline, VerificationMode};
use crate::property::{IRProperty, PassProperties};
use crate::test::helpers::*;

#[test]
fn test_identity_pass_renames_only() {
    let f = incore_add_function("foo", &[16], DataType::Float32);
    let input = program(vec![f.clone()]);

    let mut pipeline = PassPipeline::new();
    pipeline.add_pass(identity());
    let result = pipeline.run(&input).unwrap();

    let renamed = result.function("foo_identity").expect("renamed function");
    assert!(result.function("foo").is_none());
    // Everything but the (ignored) name is unchanged.
    assert!(structural_equal(renamed, &f, false));
}

#[test]
fn test_pass_names_in_order() {
    let mut pipeline = PassPipeline::new();
    pipeline.add_pass(identity());
    pipeline.add_pass(convert_tensor_to_block_ops());
    pipeline.add_pass(identity());
    assert_eq!(pipeline.pass_names(), ["Identity", "ConvertTensorToBlockOps", "Identity"]);
}

#[test]
fn test_pipeline_never_mutates_input() {
    let input = program(vec![incore_add_function("f", &[16], DataType::Float32)]);
    let snapshot = input.clone();

    let mut pipeline = PassPipeline::new();
    pipeline.add_pass(convert_tensor_to_block_ops());
    let _ = pipeline.run(&input).unwrap();

    assert!(structural_equal(&input, &snapshot, false), "input program untouched");
}

#[test]
fn test_after_mode_catches_lying_pass() {
    // A pass claiming to produce IncoreBlockOps while changing nothing: the
    // produced-property verification must fail on the residual tensor op.
    let lying = create_function_pass(
        "LyingPass",
        PassProperties {
            required: enum_set!(),
            produced: enum_set!(IRProperty::IncoreBlockOps),
            invalidated: enum_set!(),
        },
        |func| Ok(func.clone()),
    );
    let input = program(vec![incore_add_function("f", &[16], DataType::Float32)]);

    let mut pipeline = PassPipeline::new();
    pipeline.add_pass(lying.clone());

    pipeline.set_verification_mode(VerificationMode::After);
    let err = pipeline.run(&input).unwrap_err();
    assert!(matches!(err, Error::Verification { .. }));

    // Without verification the same pipeline runs through.
    let mut unchecked = PassPipeline::new();
    unchecked.add_pass(lying);
    assert!(unchecked.run(&input).is_ok());
}

#[test]
fn test_before_mode_verifies_required_properties() {
    // The input still carries scope markers, so SplitIncoreOrch (required
    // by ConvertTensorToBlockOps) does not hold.
    let input = program_with_incore_region(&[16], DataType::Float32);

    let mut pipeline = PassPipeline::new();
    pipeline.add_pass(convert_tensor_to_block_ops());
    pipeline.set_verification_mode(VerificationMode::Before);
    let err = pipeline.run(&input).unwrap_err();
    assert!(matches!(err, Error::Verification { .. }));
}

#[test]
fn test_missing_required_property_is_not_an_error() {
    // The property-set bookkeeping never blocks execution: a pass whose
    // required property was not declared still runs (and under Before mode
    // only the verifier's actual findings matter).
    let needs_type_check = create_function_pass(
        "NeedsTypeCheck",
        PassProperties {
            required: enum_set!(IRProperty::TypeChecked),
            produced: enum_set!(),
            invalidated: enum_set!(),
        },
        |func| Ok(func.clone()),
    );
    let input = program(vec![incore_add_function("f", &[16], DataType::Float32)]);

    let mut pipeline = PassPipeline::new();
    pipeline.add_pass(needs_type_check);
    pipeline.set_verification_mode(VerificationMode::Before);
    // Initial properties deliberately left empty.
    assert!(pipeline.run(&input).is_ok());
}

#[test]
fn test_empty_pipeline_returns_input() {
    let input = program(vec![incore_add_function("f", &[16], DataType::Float32)]);
    let pipeline = PassPipeline::new();
    let result = pipeline.run(&input).unwrap();
    assert!(std::rc::Rc::ptr_eq(&result, &input));
}

#[test]
fn test_empty_program_through_full_pipeline() {
    use crate::passes::*;

    let input = program(vec![]);
    let mut pipeline = PassPipeline::new();
    pipeline.add_pass(convert_to_ssa());
    pipeline.add_pass(flatten_call_expr());
    pipeline.add_pass(normalize_stmt_structure());
    pipeline.add_pass(flatten_single_stmt());
    pipeline.add_pass(outline_incore_scopes());
    pipeline.add_pass(convert_tensor_to_block_ops());
    pipeline.add_pass(init_mem_ref());
    pipeline.add_pass(basic_memory_reuse());
    pipeline.add_pass(insert_sync());
    pipeline.add_pass(add_alloc());
    pipeline.set_verification_mode(VerificationMode::BeforeAndAfter);

    let result = pipeline.run(&input).unwrap();
    assert!(result.is_empty());
}
