// sonic -- a Sonic to C++ translator for digital audio processing
// Copyright (C) 2021  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use expect_test::{expect, Expect};

use super::*;

fn test_file() -> std::sync::Arc<str> {
    let mut table = crate::token::FilenameTable::new();
    table.intern("test.son").unwrap()
}

fn fake_token(lexeme: &str) -> Token {
    Token::new(TokenKind::Identifier, lexeme, test_file(), 0, 0)
}

/// Parses a single expression with the given variables in scope.
fn parse_expr_with(input: &str, vars: &[(&str, TypeKind)]) -> Result<Expr> {
    let mut program = Program::new();
    let mut scanner = Scanner::new(input, test_file());
    let mut parser = Parser {
        program: &mut program,
        scanner: &mut scanner,
        inside_func_parms: false,
        local_parms: Vec::new(),
        local_vars: vars
            .iter()
            .map(|(name, kind)| {
                VarDecl::new(fake_token(name), SonicType::new(kind.clone()), Vec::new(), false)
            })
            .collect(),
    };
    parser.parse_expression()
}

fn check_expr(input: &str, output: Expect) {
    let expr = parse_expr_with(input, &[("w", TypeKind::Wave)]).unwrap();
    output.assert_eq(&render(&expr));
}

fn parse_program(input: &str) -> Result<Program> {
    let mut program = Program::new();
    let mut scanner = Scanner::new(input, test_file());
    parse_source(&mut program, &mut scanner)?;
    Ok(program)
}

fn parse_error(input: &str) -> String {
    match parse_program(input) {
        Ok(_) => panic!("expected parsing to fail"),
        Err(error) => error.to_string(),
    }
}

/// Compact rendering of the expression tree; parentheses make precedence
/// and associativity visible.
fn render(e: &Expr) -> String {
    match &e.kind {
        ExprKind::Constant | ExprKind::Variable | ExprKind::Builtin => {
            e.first.lexeme().to_string()
        }
        ExprKind::OldData => "$".to_string(),
        ExprKind::Vector { components } => format!("(vector {})", render_list(components)),
        ExprKind::WaveSample { channel, index } => {
            format!("(wave {} {} {})", e.first, render(channel), render(index))
        }
        ExprKind::WaveField { field } => format!("(field {} {})", e.first, field),
        ExprKind::ArrayIndex { indices } => {
            format!("(index {} {})", e.first, render_list(indices))
        }
        ExprKind::Call { kind, target, args } => {
            let label = match kind {
                CallKind::Intrinsic => "intrinsic",
                CallKind::User => "call",
                CallKind::Import => "import-call",
            };
            if args.is_empty() {
                format!("({} {})", label, target)
            } else {
                format!("({} {} {})", label, target, render_list(args))
            }
        }
        ExprKind::Binary { op, lhs, rhs, .. } => {
            format!("({} {} {})", op.target_symbol(), render(lhs), render(rhs))
        }
        ExprKind::Unary { op, operand } => {
            let label = match op {
                UnaryOp::Negate => "neg",
                UnaryOp::Not => "not",
            };
            format!("({} {})", label, render(operand))
        }
        ExprKind::Sinewave {
            amplitude,
            frequency,
            phase,
            ..
        } => format!(
            "(sinewave {} {} {})",
            render(amplitude),
            render(frequency),
            render(phase)
        ),
        ExprKind::Sawtooth { frequency, .. } => format!("(sawtooth {})", render(frequency)),
        ExprKind::Fft {
            input,
            size,
            transfer,
            freq_shift,
            ..
        } => format!(
            "(fft {} {} {} {})",
            render(input),
            render(size),
            transfer,
            render(freq_shift)
        ),
        ExprKind::Iir {
            x_coeffs,
            y_coeffs,
            input,
            ..
        } => format!(
            "(iir ({}) ({}) {})",
            render_list(x_coeffs),
            render_list(y_coeffs),
            render(input)
        ),
    }
}

fn render_list(list: &[Expr]) -> String {
    list.iter().map(render).collect::<Vec<_>>().join(" ")
}

#[test]
fn additive_binds_looser_than_multiplicative() {
    check_expr("1+2*3", expect![[r#"(+ 1 (* 2 3))"#]]);
    check_expr("1*2+3", expect![[r#"(+ (* 1 2) 3)"#]]);
}

#[test]
fn same_level_operators_group_left() {
    check_expr("1+2-3", expect![[r#"(- (+ 1 2) 3)"#]]);
    check_expr("8/4/2", expect![[r#"(/ (/ 8 4) 2)"#]]);
    check_expr("7%4%2", expect![[r#"(% (% 7 4) 2)"#]]);
}

#[test]
fn power_groups_right() {
    check_expr("2^3^2", expect![[r#"(^ 2 (^ 3 2))"#]]);
}

#[test]
fn boolean_and_relational_levels() {
    check_expr("a | b & p == q", expect![[r#"(| a (& b (== p q)))"#]]);
    check_expr("x <= y & q", expect![[r#"(& (<= x y) q)"#]]);
}

#[test]
fn diamond_is_not_equal() {
    check_expr("a <> b", expect![[r#"(!= a b)"#]]);
    check_expr("a != b", expect![[r#"(!= a b)"#]]);
}

#[test]
fn unary_operators() {
    check_expr("-x^2", expect![[r#"(^ (neg x) 2)"#]]);
    check_expr("!p & q", expect![[r#"(& (not p) q)"#]]);
    check_expr("--x", expect![[r#"(neg (neg x))"#]]);
}

#[test]
fn parentheses_override_precedence() {
    check_expr("(1+2)*3", expect![[r#"(* (+ 1 2) 3)"#]]);
}

#[test]
fn intrinsic_calls_resolve_target_names() {
    check_expr("abs(x)", expect![[r#"(intrinsic fabs x)"#]]);
    check_expr("ln(x) + log(x)", expect![[r#"(+ (intrinsic log x) (intrinsic log10 x))"#]]);
    check_expr("atan2(y, x)", expect![[r#"(intrinsic atan2 y x)"#]]);
}

#[test]
fn intrinsic_arity_is_checked_at_parse_time() {
    let error = parse_expr_with("sin(1, 2)", &[]).unwrap_err();
    assert!(
        error
            .to_string()
            .contains("wrong number of parameters to intrinsic function"),
        "{}",
        error
    );
}

#[test]
fn wave_subscripts_and_fields() {
    check_expr("w[c, i]", expect![[r#"(wave w c i)"#]]);
    check_expr("w[0, i*2]", expect![[r#"(wave w 0 (* i 2))"#]]);
    check_expr("w.n - 1", expect![[r#"(- (field w n) 1)"#]]);
    check_expr("w.max", expect![[r#"(field w max)"#]]);
}

#[test]
fn vector_literals_only_at_top_level() {
    check_expr("{ 1, 2 }", expect![[r#"(vector 1 2)"#]]);
    check_expr("{ -0.5, x+1 }", expect![[r#"(vector (neg 0.5) (+ x 1))"#]]);
}

#[test]
fn pseudo_function_forms() {
    check_expr(
        "sinewave(0.5, 440, 0)",
        expect![[r#"(sinewave 0.5 440 0)"#]],
    );
    check_expr("sawtooth(110)", expect![[r#"(sawtooth 110)"#]]);
    check_expr(
        "fft(w[c,i], 1024, spectrum, 0.0)",
        expect![[r#"(fft (wave w c i) 1024 spectrum 0.0)"#]],
    );
    check_expr(
        "iir({1, 0.5}, {0.25}, w[c,i])",
        expect![[r#"(iir (1 0.5) (0.25) (wave w c i))"#]],
    );
    check_expr("iir({1}, {}, w[c,i])", expect![[r#"(iir (1) () (wave w c i))"#]]);
}

#[test]
fn old_data_placeholder() {
    check_expr("0.5 * $", expect![[r#"(* 0.5 $)"#]]);
}

#[test]
fn array_subscript_expressions() {
    let expr = parse_expr_with(
        "a[1, n0]",
        &[
            (
                "a",
                TypeKind::Array {
                    element: crate::types::ElemType::Real,
                    dims: vec![3, 4],
                },
            ),
            ("n0", TypeKind::Integer),
        ],
    )
    .unwrap();
    assert_eq!(render(&expr), "(index a 1 n0)");
}

#[test]
fn program_structure() {
    let program = parse_program(
        "r = 48000;
         m = 1;
         interpolate = false;
         import Voice, Pluck from \"voice.h\";
         var master: real;

         function mix(a: real, b: real &): real {
             return a + b;
         }

         program demo(out: wave) {
             var gain = 0.5 : real;
             out[c,i:r] = gain * sinewave(1, 440, 0);
         }",
    )
    .unwrap();

    assert_eq!(program.sampling_rate, 48000);
    assert_eq!(program.num_channels, 1);
    assert!(!program.interpolate);
    assert_eq!(program.imports.len(), 2);
    assert_eq!(program.imports[0].header.lexeme(), "voice.h");
    assert_eq!(program.imports[1].header.lexeme(), "voice.h");
    assert_eq!(program.globals.len(), 1);
    assert_eq!(program.functions.len(), 1);

    let mix = &program.functions[0];
    assert!(!mix.params[0].ty.by_ref);
    assert!(mix.params[1].ty.by_ref);
    assert!(mix.return_type == TypeKind::Real);

    let body = program.body.as_ref().unwrap();
    assert!(body.is_program_body);
    assert_eq!(body.name.lexeme(), "demo");
    assert_eq!(body.locals.len(), 1);
    assert_eq!(body.body.len(), 1);
}

#[test]
fn defaults_apply_without_directives() {
    let program = parse_program("program p() { }").unwrap();
    assert_eq!(program.sampling_rate, 44100);
    assert_eq!(program.num_channels, 2);
    assert!(program.interpolate);
}

#[test]
fn settings_cannot_be_defined_twice() {
    let error = parse_error("r = 8000;\nr = 9000;\nprogram p() { }");
    assert!(error.contains("'r' has already been defined"), "{}", error);
    assert!(error.contains("line 2"), "{}", error);

    let error = parse_error("m = 2; m = 4; program p() { }");
    assert!(error.contains("'m' has already been defined"), "{}", error);

    let error = parse_error("interpolate = true; interpolate = false; program p() { }");
    assert!(
        error.contains("'interpolate' has already been defined"),
        "{}",
        error
    );
}

#[test]
fn channel_count_limit_names_the_limit() {
    let error = parse_error("m = 100; program p() { }");
    assert!(
        error.contains("maximum allowed number of channels is 64"),
        "{}",
        error
    );
}

#[test]
fn other_builtins_cannot_be_assigned() {
    let error = parse_error("pi = 3; program p() { }");
    assert!(
        error.contains("cannot assign a value to this built-in symbol"),
        "{}",
        error
    );
}

#[test]
fn wildcard_dimension_rules() {
    let error = parse_error("program p(a: real[3,?]) { }");
    assert!(
        error.contains("may use '?' only as first dimension of array"),
        "{}",
        error
    );

    let error = parse_error("program p() { var a: real[?]; }");
    assert!(
        error.contains("only in function parameters"),
        "{}",
        error
    );

    let program = parse_program("program p(a: real[?,4]) { }").unwrap();
    let parm = &program.body.as_ref().unwrap().params[0];
    match &parm.ty.kind {
        TypeKind::Array { dims, .. } => assert_eq!(dims, &vec![0, 4]),
        other => panic!("expected an array type, got {:?}", other),
    }
}

#[test]
fn wave_arrays_are_rejected() {
    let error = parse_error("program p() { var a: wave[4]; }");
    assert!(
        error.contains("'wave' may not be used as an array element type"),
        "{}",
        error
    );
}

#[test]
fn program_body_must_be_unique() {
    let error = parse_error("program p() { } program q() { }");
    assert!(error.contains("program body already defined"), "{}", error);
}

#[test]
fn wave_lvalue_requires_literal_c_and_i() {
    let error = parse_error("program p() { var s: wave; s[0, i] = 1; }");
    assert!(error.contains("expected 'c'"), "{}", error);
}

#[test]
fn statement_forms_parse() {
    let program = parse_program(
        "program p() {
             var k, total: integer;
             for (k = 0; k < 10; k += 1) {
                 total += k;
                 if (total > 20)
                     total = 0;
                 else
                     total += 1;
             }
             while (total > 0)
                 total -= 1;
             repeat (3)
                 total += 2;
             return;
         }",
    )
    .unwrap();
    let body = program.body.as_ref().unwrap();
    assert_eq!(body.locals.len(), 2);
    assert_eq!(body.body.len(), 4);
    assert!(matches!(body.body[0], Stmt::For { .. }));
    assert!(matches!(body.body[1], Stmt::While { .. }));
    assert!(matches!(body.body[2], Stmt::Repeat { .. }));
    assert!(matches!(body.body[3], Stmt::Return { .. }));
}

#[test]
fn names_may_not_shadow_intrinsics_or_pseudo_functions() {
    let error = parse_error("program p() { var sin: real; }");
    assert!(error.contains("conflicts with intrinsic function"), "{}", error);

    let error = parse_error("program p() { var sinewave: real; }");
    assert!(error.contains("conflicts with pseudo-function"), "{}", error);

    let error = parse_error("function fft() { } program p() { }");
    assert!(error.contains("conflicts with pseudo-function"), "{}", error);
}

#[test]
fn import_constructor_arguments_attach_to_the_type() {
    let program = parse_program(
        "import Voice from \"voice.h\";
         program p() { var v: Voice(440, 0.5, 0.5); }",
    )
    .unwrap();
    let decl = &program.body.as_ref().unwrap().locals[0];
    assert!(matches!(decl.ty.kind, TypeKind::Import(ref name) if name == "Voice"));
    assert_eq!(decl.init.len(), 3);
}

#[test]
fn call_statement_requires_a_call() {
    let error = parse_error("program p() { sinewave(1, 2, 3); }");
    assert!(error.contains("expected function call"), "{}", error);
}
