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

use expect_test::expect;

use super::generate;
use crate::ast::Program;
use crate::error::Result;
use crate::parser::parse_source;
use crate::scanner::Scanner;
use crate::token::FilenameTable;
use crate::validate::validate;

fn try_translate(source: &str) -> Result<String> {
    let mut table = FilenameTable::new();
    let file = table.intern("test.son").unwrap();
    let mut program = Program::new();
    let mut scanner = Scanner::new(source, file);
    parse_source(&mut program, &mut scanner)?;
    validate(&mut program)?;
    let mut out = Vec::new();
    generate(&program, &mut out)?;
    Ok(String::from_utf8(out).expect("generated code is not UTF-8"))
}

fn translate(source: &str) -> String {
    try_translate(source).unwrap()
}

fn count(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}

/// Every wave opened in a statement block is closed in the same block.
fn assert_open_close_balance(output: &str) {
    assert_eq!(
        count(output, ".open_for_"),
        count(output, ".close();"),
        "open/close calls unbalanced in:\n{}",
        output
    );
}

#[test]
fn first_line_identifies_the_translator() {
    let output = translate("program beep() { }");
    let first = output.lines().next().unwrap();
    assert!(
        first.starts_with("// beep.cpp  -  generated by the Sonic translator v"),
        "{}",
        first
    );
}

#[test]
fn constants_reflect_the_program_settings() {
    let output = translate("r = 48000; m = 1; interpolate = false; program foo() { }");
    assert!(output.contains("const long    SamplingRate     =  48000;"), "{}", output);
    assert!(output.contains("const int     NumChannels      =  1;"), "{}", output);
    assert!(output.contains("const int     InterpolateFlag  =  0;"), "{}", output);
    assert!(output.contains("const double  SampleTime       =  1.0 / double(SamplingRate);"));
    assert!(output.contains("const double pi = 4.0 * atan(1.0);"));
}

#[test]
fn sine_beep_program() {
    // S1: write mode, explicit limit, one shared oscillator.
    let output = translate("program beep() { var s: wave; s[c,i:r] = sinewave(0.5, 440, 0); }");

    assert!(output.contains("if ( argc != 1 )"), "{}", output);
    assert!(output.contains("v_s.open_for_write();"), "{}", output);
    assert!(
        output.contains("const long numSamples = long(SamplingRate);"),
        "{}",
        output
    );
    assert!(output.contains("for ( long i=0; i < numSamples; ++i, t += SampleTime )"));

    // Exactly NumChannels assignment lines, fed by one shared sinewave
    // temporary seeded before the loop and advanced before the lines.
    assert_eq!(count(&output, "// sinewave init"), 1, "{}", output);
    assert_eq!(count(&output, "// sinewave update"), 1, "{}", output);
    assert!(output.contains("sample[0] = t_0[2];"), "{}", output);
    assert!(output.contains("sample[1] = t_0[2];"), "{}", output);

    assert!(output.contains("v_s.write ( sample );"), "{}", output);
    assert_open_close_balance(&output);
}

#[test]
fn noise_program_with_scaled_limit() {
    // S2: settings flow into the constants and the loop bound.
    let output =
        translate("r = 48000; m = 1; program foo(out: wave) { out[c,i:r*2] = noise(1.0); }");

    assert!(output.contains("const long    SamplingRate     =  48000;"));
    assert!(output.contains("const int     NumChannels      =  1;"));
    assert!(
        output.contains("const long numSamples = long(SamplingRate*2);"),
        "{}",
        output
    );
    assert!(output.contains("Sonic_Noise(double(1.0))"), "{}", output);
    assert!(output.contains("SampleWave v_out ( argv[1], \"out\", SamplingRate, NumChannels );"));
    assert!(output.contains("v_out.convert_to_wav ( argv[1] );"));
    assert!(output.contains("erase_all_temp_files();"));
}

#[test]
fn mixing_two_waves_uses_the_countdown() {
    // S3: unbounded loop terminated by the countdown mechanism.
    let output = translate(
        "program mix(a: wave, b: wave, out: wave) { out[c,i] = 0.5*a[c,i] + 0.5*b[c,i]; }",
    );

    assert!(output.contains("v_out.open_for_write();"), "{}", output);
    assert!(output.contains("v_a.open_for_read();"), "{}", output);
    assert!(output.contains("v_b.open_for_read();"), "{}", output);
    assert!(output.contains("for ( long i=0; ; ++i, t += SampleTime )"), "{}", output);
    assert!(output.contains("int countdown = NumChannels * 2;"), "{}", output);
    assert!(output.contains("if ( countdown <= 0 ) break;"), "{}", output);

    // The integer index 'i' fetches directly instead of interpolating.
    assert!(output.contains("v_a.fetch(int(0), long(i), countdown)"), "{}", output);
    assert_eq!(count(&output, ".close();"), 3, "{}", output);
    assert_open_close_balance(&output);
}

#[test]
fn old_data_forces_modify_mode() {
    // S4: '$' reads the prior frame before the channel lines rewrite it.
    let output = translate("program dup(w: wave) { w[c,i] += $; }");

    assert!(output.contains("v_w.open_for_modify();"), "{}", output);
    assert!(
        output.contains("const long numSamples = v_w.query_num_samples();"),
        "{}",
        output
    );
    assert!(output.contains("v_w.read ( sample );"), "{}", output);
    assert!(output.contains("sample[0] += sample[0];"), "{}", output);
    assert!(output.contains("sample[1] += sample[1];"), "{}", output);
    assert_open_close_balance(&output);
}

#[test]
fn import_objects_reset_once_per_assignment() {
    // S5: the header is included, the constructor arguments are passed
    // through, and reset is emitted exactly once.
    let output = translate(
        "import Voice from \"voice.h\";
         program p() {
             var v: Voice(440, 0.5, 0.5);
             var out: wave;
             out[c,i:r] = v(c, i);
         }",
    );

    assert!(output.contains("#include \"voice.h\""), "{}", output);
    assert!(output.contains("i_Voice v_v ( 440, 0.5, 0.5 );"), "{}", output);
    assert_eq!(
        count(&output, "v_v.reset ( NumChannels, SamplingRate );"),
        1,
        "{}",
        output
    );
    assert!(output.contains("sample[0] = v_v(0, i);"), "{}", output);
    assert!(output.contains("sample[1] = v_v(1, i);"), "{}", output);
}

#[test]
fn import_reset_is_emitted_once_even_for_repeated_references() {
    let output = translate(
        "import Voice from \"voice.h\";
         program p() {
             var v: Voice(220, 1, 1);
             var out: wave;
             out[c,i:r] = v(c, i) + v(c, i) * 0.5;
         }",
    );
    assert_eq!(
        count(&output, "v_v.reset ( NumChannels, SamplingRate );"),
        1,
        "{}",
        output
    );
}

#[test]
fn fft_constructs_one_filter_before_the_loop() {
    // S6: one FftFilter temporary wired to the transfer function.
    let output = translate(
        "program filt(w: wave, out: wave) { out[c,i] = fft(w[c,i], 1024, spectrum, 0.0); }
         function spectrum(f: real, zr: real &, zi: real &) { zr = f; zi = 0; }",
    );

    assert_eq!(
        count(
            &output,
            "FftFilter t_0 ( NumChannels, SamplingRate, int(1024), f_spectrum, double(0.0) );"
        ),
        1,
        "{}",
        output
    );
    assert!(output.contains("t_0.filter(0, v_w.fetch(int(0), long(i), countdown))"), "{}", output);
    assert!(output.contains("t_0.filter(1, v_w.fetch(int(1), long(i), countdown))"), "{}", output);
    assert!(output.contains("void f_spectrum ("), "{}", output);
    assert!(output.contains("double &v_zr"), "{}", output);
}

#[test]
fn vector_rvalue_emits_one_line_per_component() {
    let output = translate("program p() { var s: wave; s[c,i:100] = {0.25, -0.25}; }");
    assert!(output.contains("sample[0] = 0.25;"), "{}", output);
    assert!(output.contains("sample[1] = -0.25;"), "{}", output);
    // Exactly one assignment line per vector component.
    assert_eq!(count(&output, "sample["), 2, "{}", output);
}

#[test]
fn interpolation_depends_on_flag_and_index_type() {
    let interpolated =
        translate("program p(w: wave, out: wave) { out[c,i] = w[c, i*0.5]; }");
    assert!(interpolated.contains("v_w.interp(int(0), double(i*0.5), countdown)"), "{}", interpolated);

    let truncated = translate(
        "interpolate = false; program p(w: wave, out: wave) { out[c,i] = w[c, i*0.5]; }",
    );
    assert!(truncated.contains("v_w.fetch(int(0), long(i*0.5), countdown)"), "{}", truncated);
}

#[test]
fn append_mode_and_wave_length_fields() {
    let output = translate(
        "program p(w: wave, out: wave) {
             out[c,i:w.n] = w[c,i];
             out[c,i:r] << 0.0;
         }",
    );
    assert!(output.contains("v_out.open_for_write();"), "{}", output);
    assert!(output.contains("v_out.open_for_append();"), "{}", output);
    assert!(
        output.contains("const long numSamples = long(v_w.query_num_samples());"),
        "{}",
        output
    );
    // Append writes plain '=' into the frame.
    assert!(output.contains("sample[0] = 0.0;"), "{}", output);
    assert_open_close_balance(&output);
}

#[test]
fn iir_state_machine_is_laid_out_per_channel() {
    let output = translate(
        "program p(w: wave, out: wave) { out[c,i] = iir({0.5, 0.3, 0.2}, {0.1}, w[c,i]); }",
    );

    assert_eq!(count(&output, "// iir x-coefficients"), 1, "{}", output);
    assert_eq!(count(&output, "// iir y-coefficients"), 1, "{}", output);
    assert_eq!(count(&output, "// iir x-buffer"), 2, "{}", output);
    assert_eq!(count(&output, "// iir y-buffer"), 2, "{}", output);
    assert_eq!(count(&output, "// iir accumulator"), 1, "{}", output);
    assert!(output.contains("// iir x dot product"), "{}", output);
    assert!(output.contains("// iir y dot product"), "{}", output);
    assert!(output.contains("if ( --t_6 < 0 )  t_6 = 2;"), "{}", output);
}

#[test]
fn scalar_statements_translate_structurally() {
    let output = translate(
        "program p() {
             var k, total: integer;
             for (k = 0; k < 10; k += 1)
                 total += k;
             while (total > 0)
                 total -= 1;
             repeat (3)
                 total += 2;
             if (total == 0)
                 total = 1;
             else
                 total = 2;
         }",
    );

    assert!(output.contains("for ( v_k = 0; v_k < 10; v_k += 1 )"), "{}", output);
    assert!(output.contains("while ( v_total > 0 )"), "{}", output);
    assert!(output.contains("for ( long t_0 = long(3); t_0 > 0; --t_0 )"), "{}", output);
    assert!(output.contains("if ( v_total == 0 )"), "{}", output);
    assert!(output.contains("else"), "{}", output);
    assert!(output.contains("long v_k = 0;"), "{}", output);
    assert!(output.contains("long v_total = 0;"), "{}", output);
}

#[test]
fn main_scans_scalar_arguments() {
    let output = translate("program p(n0: integer, gain: real, fast: boolean) { }");
    assert!(output.contains("if ( argc != 4 )"), "{}", output);
    assert!(output.contains("long v_n0 = scan_integer ( \"n0\", argv[1] );"), "{}", output);
    assert!(output.contains("double v_gain = scan_real ( \"gain\", argv[2] );"), "{}", output);
    assert!(output.contains("int v_fast = scan_boolean ( \"fast\", argv[3] );"), "{}", output);
    assert!(output.contains("f_p ( v_n0, v_gain, v_fast );"), "{}", output);
    assert!(output.contains("cerr << \"Use:  p n0 gain fast\" << endl << endl;"), "{}", output);
}

#[test]
fn globals_are_emitted_before_main() {
    let output = translate("var master: real; program p() { master = 0.5; }");
    let globals_at = output.find("// global variables...").unwrap();
    let main_at = output.find("int main (").unwrap();
    assert!(globals_at < main_at, "{}", output);
    assert!(output.contains("double v_master = 0;"), "{}", output);
    assert!(output.contains("v_master = 0.5;"), "{}", output);
}

#[test]
fn power_and_modulo_lower_to_library_calls() {
    let output = translate(
        "program p() {
             var x, y: real;
             var j, k: integer;
             x = y ^ 2;
             x = y % 2;
             j = k % 2;
         }",
    );
    assert!(output.contains("v_x = pow(double(v_y),double(2));"), "{}", output);
    assert!(output.contains("v_x = fmod(double(v_y),double(2));"), "{}", output);
    assert!(output.contains("v_j = v_k%2;"), "{}", output);
}

#[test]
fn comment_restates_the_original_statement() {
    let output = translate("program beep() { var s: wave; s[c,i:r] = sinewave(0.5, 440, 0); }");
    assert!(
        output.contains("//  s[c,i:r] = sinewave(0.5,440,0);"),
        "{}",
        output
    );
}

#[test]
fn length_cannot_always_be_determined() {
    let error = try_translate("program p() { var s: wave; s[c,i] = 0.5; }").unwrap_err();
    expect![[r#"
        Error: cannot determine number of samples to generate
        Source file: 'test.son' line 1 column 37
        near token '0.5'"#]]
    .assert_eq(&error.to_string());
}

#[test]
fn loop_context_symbols_are_rejected_outside_loops() {
    let error = try_translate("program p() { var x: real; x = i; }").unwrap_err();
    assert!(
        error.to_string().contains("time-based placeholder not allowed here"),
        "{}",
        error
    );

    let error = try_translate("program p() { var x: real; x = n; }").unwrap_err();
    assert!(
        error.to_string().contains("expected '<wavename>.' before 'n'"),
        "{}",
        error
    );
}

#[test]
fn bare_wave_length_refers_to_the_bracketing_wave() {
    let output = translate("program p(w: wave, out: wave) { out[c,i] = w[c, n-i]; }");
    assert!(
        output.contains("v_w.fetch(int(0), long(v_w.query_num_samples() - i), countdown)"),
        "{}",
        output
    );
}

#[test]
fn arrays_declare_and_subscript_with_c_syntax() {
    let output = translate(
        "program p() {
             var a: real[3,4];
             var k: integer;
             a[1, 2] = 0.5;
             a[k, k] = a[1, 2] + 1;
         }",
    );
    assert!(output.contains("double v_a[3][4];"), "{}", output);
    assert!(output.contains("v_a[1][2] = 0.5;"), "{}", output);
    assert!(output.contains("v_a[v_k][v_k] = v_a[1][2] + 1;"), "{}", output);
}

#[test]
fn wildcard_parameter_dimension_is_an_open_array() {
    let output = translate(
        "program p() { var data: real[8]; f(data); }
         function f(chunk: real[?]) { chunk[0] = 0; }",
    );
    assert!(output.contains("double v_chunk[]"), "{}", output);
    assert!(output.contains("double v_data[8];"), "{}", output);
}

#[test]
fn booleans_emit_as_integers() {
    let output = translate("program p() { var flag: boolean; flag = true; if (flag) flag = false; }");
    assert!(output.contains("int v_flag = 0;"), "{}", output);
    assert!(output.contains("v_flag = 1;"), "{}", output);
    assert!(output.contains("if ( v_flag )"), "{}", output);
    assert!(output.contains("v_flag = 0;"), "{}", output);
}
