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

//! Expression emission.
//!
//! Every expression is visited up to three times per wave assignment:
//! once before the sample loop (allocating temporaries and seeding
//! generator state), once per loop iteration before the channel lines
//! (advancing oscillator and filter state), and once per channel line
//! (producing the value). The same walk with `generating_comment` set
//! renders the original Sonic spelling instead.

use std::io::Write;

use super::{CodeGen, IirTemps, FUNCTION_PREFIX, LOCAL_PREFIX, TEMPORARY_PREFIX};
use crate::ast::{BinaryOp, CallKind, Expr, ExprKind, UnaryOp};
use crate::error::{Result, TranslationError};
use crate::types::TypeKind;

impl<'a> CodeGen<'a> {
    pub(super) fn gen_expr(&mut self, o: &mut dyn Write, e: &Expr) -> Result<()> {
        match &e.kind {
            ExprKind::Constant => {
                if e.ty == TypeKind::Str {
                    write!(o, "\"{}\"", e.first)?;
                } else {
                    write!(o, "{}", e.first)?;
                }
                Ok(())
            }
            ExprKind::Variable => {
                if !self.generating_comment {
                    write!(o, "{}", LOCAL_PREFIX)?;
                }
                write!(o, "{}", e.first)?;
                Ok(())
            }
            ExprKind::Builtin => self.gen_builtin(o, e),
            ExprKind::OldData => {
                if self.generating_comment {
                    write!(o, "$")?;
                    return Ok(());
                }
                if !self.i_allowed {
                    return Err(TranslationError::semantic(
                        "old-data symbol cannot appear here",
                        &e.first,
                    ));
                }
                let channel = self.require_channel(e)?;
                write!(o, "sample[{}]", channel)?;
                Ok(())
            }
            ExprKind::Vector { components } => {
                write!(o, "{{ ")?;
                for (index, component) in components.iter().enumerate() {
                    self.gen_expr(o, component)?;
                    if index + 1 < components.len() {
                        write!(o, ", ")?;
                    }
                }
                write!(o, " }}")?;
                Ok(())
            }
            ExprKind::WaveSample { channel, index } => {
                if self.generating_comment {
                    write!(o, "{}[", e.first)?;
                    self.gen_expr(o, channel)?;
                    write!(o, ",")?;
                    self.gen_expr(o, index)?;
                    write!(o, "]")?;
                    return Ok(());
                }
                if !self.i_allowed {
                    return Err(TranslationError::semantic(
                        "wave expression not allowed here",
                        &e.first,
                    ));
                }
                let saved = self.bracketer.take();
                self.bracketer = Some(e.first.lexeme().to_string());

                // Non-integer indices interpolate between neighboring
                // samples when the program asks for it.
                if self.program.interpolate && index.ty != TypeKind::Integer {
                    write!(o, "{}{}.interp(int(", LOCAL_PREFIX, e.first)?;
                    self.gen_expr(o, channel)?;
                    write!(o, "), double(")?;
                    self.gen_expr(o, index)?;
                    write!(o, "), countdown)")?;
                } else {
                    write!(o, "{}{}.fetch(int(", LOCAL_PREFIX, e.first)?;
                    self.gen_expr(o, channel)?;
                    write!(o, "), long(")?;
                    self.gen_expr(o, index)?;
                    write!(o, "), countdown)")?;
                }

                self.bracketer = saved;
                Ok(())
            }
            ExprKind::WaveField { field } => {
                if self.generating_comment {
                    write!(o, "{}.{}", e.first, field)?;
                    return Ok(());
                }
                match field.lexeme() {
                    "r" => write!(o, "SamplingRate")?,
                    "m" => write!(o, "NumChannels")?,
                    "interpolate" => write!(o, "InterpolateFlag")?,
                    "n" => write!(o, "{}{}.query_num_samples()", LOCAL_PREFIX, e.first)?,
                    "max" => write!(o, "{}{}.query_max_value()", LOCAL_PREFIX, e.first)?,
                    _ => {
                        return Err(TranslationError::internal(
                            "unknown wave field survived validation",
                            Some(field),
                        ))
                    }
                }
                Ok(())
            }
            ExprKind::ArrayIndex { indices } => {
                if self.generating_comment {
                    write!(o, "{}[", e.first)?;
                    for (index, subscript) in indices.iter().enumerate() {
                        self.gen_expr(o, subscript)?;
                        if index + 1 < indices.len() {
                            write!(o, ",")?;
                        }
                    }
                    write!(o, "]")?;
                    return Ok(());
                }
                write!(o, "{}{}", LOCAL_PREFIX, e.first)?;
                self.gen_array_subscripts(o, indices)?;
                Ok(())
            }
            ExprKind::Call { kind, target, args } => {
                if !self.generating_comment {
                    match kind {
                        CallKind::User => write!(o, "{}", FUNCTION_PREFIX)?,
                        CallKind::Import => write!(o, "{}", LOCAL_PREFIX)?,
                        CallKind::Intrinsic => {}
                    }
                }
                let printed_name = if self.generating_comment {
                    e.first.lexeme()
                } else {
                    target.as_str()
                };
                // Intrinsic parameters are always double.
                let cast = *kind == CallKind::Intrinsic && !self.generating_comment;
                write!(o, "{}(", printed_name)?;
                for (index, arg) in args.iter().enumerate() {
                    if cast {
                        write!(o, "double(")?;
                    }
                    self.gen_expr(o, arg)?;
                    if cast {
                        write!(o, ")")?;
                    }
                    if index + 1 < args.len() {
                        write!(o, ", ")?;
                    }
                }
                write!(o, ")")?;
                Ok(())
            }
            ExprKind::Binary { op, lhs, rhs, .. } => self.gen_binary(o, *op, lhs, rhs),
            ExprKind::Unary { op, operand } => {
                let symbol = match op {
                    UnaryOp::Negate => "-",
                    UnaryOp::Not => "!",
                };
                write!(o, "{}", symbol)?;
                if operand.precedence() <= e.precedence() {
                    write!(o, "(")?;
                    self.gen_expr(o, operand)?;
                    write!(o, ")")?;
                } else {
                    self.gen_expr(o, operand)?;
                }
                Ok(())
            }
            ExprKind::Sinewave {
                tag,
                amplitude,
                frequency,
                phase,
            } => {
                if self.generating_comment {
                    write!(o, "sinewave(")?;
                    self.gen_expr(o, amplitude)?;
                    write!(o, ",")?;
                    self.gen_expr(o, frequency)?;
                    write!(o, ",")?;
                    self.gen_expr(o, phase)?;
                    write!(o, ")")?;
                    return Ok(());
                }
                if !self.i_allowed {
                    return Err(TranslationError::semantic(
                        "sinewave construct not allowed here",
                        &e.first,
                    ));
                }
                let channel = self.require_channel(e)?;
                let temp = self.osc_temp(*tag, channel, e)?;
                write!(o, "{}{}[2]", TEMPORARY_PREFIX, temp)?;
                Ok(())
            }
            ExprKind::Sawtooth { tag, frequency } => {
                if self.generating_comment {
                    write!(o, "sawtooth(")?;
                    self.gen_expr(o, frequency)?;
                    write!(o, ")")?;
                    return Ok(());
                }
                if !self.c_allowed {
                    return Err(TranslationError::semantic(
                        "sawtooth construct not allowed here",
                        &e.first,
                    ));
                }
                let channel = self.require_channel(e)?;
                let temp = self.osc_temp(*tag, channel, e)?;
                write!(o, "{}{}[0]", TEMPORARY_PREFIX, temp)?;
                Ok(())
            }
            ExprKind::Fft {
                tag,
                input,
                size,
                transfer,
                freq_shift,
            } => {
                if self.generating_comment {
                    write!(o, "fft(")?;
                    self.gen_expr(o, input)?;
                    write!(o, ",")?;
                    self.gen_expr(o, size)?;
                    write!(o, ",{},", transfer)?;
                    self.gen_expr(o, freq_shift)?;
                    write!(o, ")")?;
                    return Ok(());
                }
                if !self.i_allowed || !self.c_allowed {
                    return Err(TranslationError::semantic(
                        "pseudo-function 'fft' not allowed here",
                        &e.first,
                    ));
                }
                let channel = self.require_channel(e)?;
                let temp = self.fft_temps.get(tag).copied().ok_or_else(|| {
                    TranslationError::internal(
                        "fft temporary was not initialized before use",
                        Some(&e.first),
                    )
                })?;
                write!(o, "{}{}.filter({}, ", TEMPORARY_PREFIX, temp, channel)?;
                self.gen_expr(o, input)?;
                write!(o, ")")?;
                Ok(())
            }
            ExprKind::Iir {
                tag,
                x_coeffs,
                y_coeffs,
                input,
            } => {
                if self.generating_comment {
                    write!(o, "iir({{")?;
                    for (index, coeff) in x_coeffs.iter().enumerate() {
                        self.gen_expr(o, coeff)?;
                        if index + 1 < x_coeffs.len() {
                            write!(o, ",")?;
                        }
                    }
                    write!(o, "}},{{")?;
                    for (index, coeff) in y_coeffs.iter().enumerate() {
                        self.gen_expr(o, coeff)?;
                        if index + 1 < y_coeffs.len() {
                            write!(o, ",")?;
                        }
                    }
                    write!(o, "}},")?;
                    self.gen_expr(o, input)?;
                    write!(o, ")")?;
                    return Ok(());
                }
                if !self.i_allowed {
                    return Err(TranslationError::semantic(
                        "iir construct not allowed here",
                        &e.first,
                    ));
                }
                let channel = self.require_channel(e)?;
                let temps = self.iir_temps.get(tag).ok_or_else(|| {
                    TranslationError::internal(
                        "iir temporaries were not initialized before use",
                        Some(&e.first),
                    )
                })?;
                write!(o, "{}{}[{}]", TEMPORARY_PREFIX, temps.accum, channel)?;
                Ok(())
            }
        }
    }

    fn gen_builtin(&mut self, o: &mut dyn Write, e: &Expr) -> Result<()> {
        let name = e.first.lexeme();
        if self.generating_comment {
            write!(o, "{}", name)?;
            return Ok(());
        }
        match name {
            "r" => write!(o, "SamplingRate")?,
            "m" => write!(o, "NumChannels")?,
            "true" => write!(o, "1")?,
            "false" => write!(o, "0")?,
            "interpolate" => write!(o, "InterpolateFlag")?,
            "n" => match &self.bracketer {
                Some(wave) => write!(o, "{}{}.query_num_samples()", LOCAL_PREFIX, wave)?,
                None => {
                    return Err(TranslationError::semantic(
                        "expected '<wavename>.' before 'n'",
                        &e.first,
                    ))
                }
            },
            _ => {
                if !self.i_allowed && (name == "i" || name == "t") {
                    return Err(TranslationError::semantic(
                        "time-based placeholder not allowed here",
                        &e.first,
                    ));
                }
                if !self.c_allowed && name == "c" {
                    return Err(TranslationError::semantic(
                        "channel placeholder not allowed here",
                        &e.first,
                    ));
                }
                match (name, self.channel_value) {
                    ("c", Some(channel)) => write!(o, "{}", channel)?,
                    _ => write!(o, "{}", name)?,
                }
            }
        }
        Ok(())
    }

    fn gen_binary(
        &mut self,
        o: &mut dyn Write,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<()> {
        if op == BinaryOp::Power {
            write!(o, "pow(double(")?;
            self.gen_expr(o, lhs)?;
            write!(o, "),double(")?;
            self.gen_expr(o, rhs)?;
            write!(o, "))")?;
            return Ok(());
        }
        // '%' falls back to fmod unless both operands stay integral.
        if op == BinaryOp::Modulo
            && (lhs.ty != TypeKind::Integer || rhs.ty != TypeKind::Integer)
        {
            write!(o, "fmod(double(")?;
            self.gen_expr(o, lhs)?;
            write!(o, "),double(")?;
            self.gen_expr(o, rhs)?;
            write!(o, "))")?;
            return Ok(());
        }

        let precedence = op.precedence();
        let lparen = lhs.precedence() < precedence;
        if lparen {
            write!(o, "(")?;
        }
        self.gen_expr(o, lhs)?;
        if lparen {
            write!(o, ")")?;
        }

        let spaced = op.is_boolean() || matches!(op, BinaryOp::Add | BinaryOp::Subtract);
        if spaced {
            write!(o, " {} ", op.target_symbol())?;
        } else {
            write!(o, "{}", op.target_symbol())?;
        }

        let rparen = if rhs.precedence() == precedence {
            op.groups_to_right()
        } else {
            rhs.precedence() < precedence
        };
        if rparen {
            write!(o, "(")?;
        }
        self.gen_expr(o, rhs)?;
        if rparen {
            write!(o, ")")?;
        }
        Ok(())
    }

    // ---- pre-sample-loop code ---------------------------------------

    /// Emitted once per wave assignment, before its sample loop: filter
    /// construction, coefficient and delay-line arrays, oscillator seeds,
    /// and one `reset` per import variable.
    pub(super) fn gen_pre_sample(&mut self, o: &mut dyn Write, e: &Expr) -> Result<()> {
        match &e.kind {
            ExprKind::Constant
            | ExprKind::Variable
            | ExprKind::Builtin
            | ExprKind::OldData
            | ExprKind::WaveField { .. } => Ok(()),
            ExprKind::Vector { components } => {
                let saved = self.channel_value;
                for (index, component) in components.iter().enumerate() {
                    self.channel_value = Some(index);
                    self.gen_pre_sample(o, component)?;
                }
                self.channel_value = saved;
                Ok(())
            }
            ExprKind::WaveSample { channel, index } => {
                let (i_saved, c_saved) = (self.i_allowed, self.c_allowed);
                self.i_allowed = true;
                self.c_allowed = true;
                self.gen_pre_sample(o, channel)?;
                self.gen_pre_sample(o, index)?;
                self.i_allowed = i_saved;
                self.c_allowed = c_saved;
                Ok(())
            }
            ExprKind::ArrayIndex { indices } => {
                for index in indices {
                    self.gen_pre_sample(o, index)?;
                }
                Ok(())
            }
            ExprKind::Binary { lhs, rhs, .. } => {
                self.gen_pre_sample(o, lhs)?;
                self.gen_pre_sample(o, rhs)
            }
            ExprKind::Unary { operand, .. } => self.gen_pre_sample(o, operand),
            ExprKind::Call { kind, args, .. } => {
                if *kind == CallKind::Import {
                    self.gen_import_reset(o, e)?;
                }
                for arg in args {
                    self.gen_pre_sample(o, arg)?;
                }
                Ok(())
            }
            ExprKind::Sinewave {
                tag,
                amplitude,
                frequency,
                phase,
            } => self.gen_sinewave_pre_sample(o, e, *tag, amplitude, frequency, phase),
            ExprKind::Sawtooth { tag, frequency } => {
                self.gen_sawtooth_pre_sample(o, e, *tag, frequency)
            }
            ExprKind::Fft {
                tag,
                input,
                size,
                transfer,
                freq_shift,
            } => {
                self.gen_pre_sample(o, input)?;
                let temp = self.next_temp();
                self.fft_temps.insert(*tag, temp);
                self.indent(o, "FftFilter ")?;
                write!(
                    o,
                    "{}{} ( NumChannels, SamplingRate, int(",
                    TEMPORARY_PREFIX, temp
                )?;
                self.gen_expr(o, size)?;
                write!(o, "), {}{}, double(", FUNCTION_PREFIX, transfer)?;
                self.gen_expr(o, freq_shift)?;
                writeln!(o, ") );")?;
                Ok(())
            }
            ExprKind::Iir {
                tag,
                x_coeffs,
                y_coeffs,
                input,
            } => self.gen_iir_pre_sample(o, *tag, x_coeffs, y_coeffs, input),
        }
    }

    /// The `reset` call for an import function object is emitted exactly
    /// once per assignment statement, no matter how often the object is
    /// referenced in it.
    fn gen_import_reset(&mut self, o: &mut dyn Write, e: &Expr) -> Result<()> {
        let decl = self
            .program
            .find_symbol(&e.first, self.func)
            .ok_or_else(|| {
                TranslationError::internal(
                    "import variable vanished between validation and code generation",
                    Some(&e.first),
                )
            })?;
        if !decl.reset_emitted.get() {
            decl.reset_emitted.set(true);
            self.indent(o, LOCAL_PREFIX)?;
            writeln!(o, "{}.reset ( NumChannels, SamplingRate );", e.first)?;
        }
        Ok(())
    }

    fn gen_sinewave_pre_sample(
        &mut self,
        o: &mut dyn Write,
        e: &Expr,
        tag: u32,
        amplitude: &Expr,
        frequency: &Expr,
        phase: &Expr,
    ) -> Result<()> {
        let channel_dependent = e.is_channel_dependent();
        let (start, limit) = self.osc_channel_range(channel_dependent, e)?;
        let num_channels = self.program.num_channels as usize;
        let mut tags = vec![0u32; num_channels];

        let c_saved = self.c_allowed;
        let channel_saved = self.channel_value;
        self.c_allowed = true;
        for channel in start..limit {
            self.channel_value = Some(channel);
            let temp = self.next_temp();
            tags[channel] = temp;
            let name = format!("{}{}", TEMPORARY_PREFIX, temp);

            self.indent(o, "double ")?;
            write!(o, "{}[4];     // sinewave init", name)?;
            if channel_dependent || self.inside_vector {
                write!(o, " [c={}]", channel)?;
            }
            writeln!(o)?;

            self.indent(o, &name)?;
            write!(o, "[2] = -2 * pi * (")?;
            self.gen_expr(o, frequency)?;
            writeln!(o, ") * SampleTime;")?;

            self.indent(o, &name)?;
            write!(o, "[1] = (")?;
            self.gen_expr(o, phase)?;
            writeln!(o, ") * pi / 180.0;")?;

            self.indent(o, &name)?;
            write!(o, "[3] = ")?;
            self.gen_expr(o, amplitude)?;
            writeln!(o, ";")?;

            self.indent(o, &name)?;
            writeln!(o, "[0] = {}[3] * sin ( 2*{}[2] + {}[1] );", name, name, name)?;
            self.indent(o, &name)?;
            writeln!(o, "[1] = {}[3] * sin ( {}[2] + {}[1] );", name, name, name)?;
            self.indent(o, &name)?;
            writeln!(o, "[3] = 2 * cos ( {}[2] );", name)?;
        }
        self.c_allowed = c_saved;
        self.channel_value = channel_saved;

        if !channel_dependent && !self.inside_vector {
            // One shared oscillator feeds every channel.
            for channel in 1..num_channels {
                tags[channel] = tags[0];
            }
        }
        self.osc_temps.insert(tag, tags);
        Ok(())
    }

    fn gen_sawtooth_pre_sample(
        &mut self,
        o: &mut dyn Write,
        e: &Expr,
        tag: u32,
        frequency: &Expr,
    ) -> Result<()> {
        let channel_dependent = e.is_channel_dependent();
        let (start, limit) = self.osc_channel_range(channel_dependent, e)?;
        let num_channels = self.program.num_channels as usize;
        let mut tags = vec![0u32; num_channels];

        let c_saved = self.c_allowed;
        let channel_saved = self.channel_value;
        self.c_allowed = true;
        for channel in start..limit {
            self.channel_value = Some(channel);
            let temp = self.next_temp();
            tags[channel] = temp;
            let name = format!("{}{}", TEMPORARY_PREFIX, temp);

            self.indent(o, "double ")?;
            write!(o, "{}[] = {{ 0, 4*SampleTime*(", name)?;
            self.gen_expr(o, frequency)?;
            write!(o, ") }};   // sawtooth init")?;
            if channel_dependent || self.inside_vector {
                write!(o, " [c={}]", channel)?;
            }
            writeln!(o)?;

            self.indent(o, &name)?;
            writeln!(o, "[0] -= {}[1];", name)?;
        }
        self.c_allowed = c_saved;
        self.channel_value = channel_saved;

        if !channel_dependent && !self.inside_vector {
            for channel in 1..num_channels {
                tags[channel] = tags[0];
            }
        }
        self.osc_temps.insert(tag, tags);
        Ok(())
    }

    fn gen_iir_pre_sample(
        &mut self,
        o: &mut dyn Write,
        tag: u32,
        x_coeffs: &[Expr],
        y_coeffs: &[Expr],
        input: &Expr,
    ) -> Result<()> {
        self.gen_pre_sample(o, input)?;

        let mut temps = IirTemps::default();

        temps.x_coeff = self.next_temp();
        self.indent(o, "const double ")?;
        writeln!(
            o,
            "{}{}[] = {{    // iir x-coefficients",
            TEMPORARY_PREFIX, temps.x_coeff
        )?;
        self.push_indent();
        for (index, coeff) in x_coeffs.iter().enumerate() {
            self.indent(o, "")?;
            self.gen_expr(o, coeff)?;
            if index + 1 < x_coeffs.len() {
                writeln!(o, ",")?;
            }
        }
        writeln!(o, " }};")?;
        self.pop_indent();

        if !y_coeffs.is_empty() {
            temps.y_coeff = self.next_temp();
            self.indent(o, "const double ")?;
            writeln!(
                o,
                "{}{}[] = {{    // iir y-coefficients",
                TEMPORARY_PREFIX, temps.y_coeff
            )?;
            self.push_indent();
            for (index, coeff) in y_coeffs.iter().enumerate() {
                self.indent(o, "")?;
                self.gen_expr(o, coeff)?;
                if index + 1 < y_coeffs.len() {
                    writeln!(o, ",")?;
                }
            }
            writeln!(o, " }};")?;
            self.pop_indent();
        }

        let num_channels = self.program.num_channels as usize;
        for channel in 0..num_channels {
            let temp = self.next_temp();
            temps.x_buffer.push(temp);
            self.indent(o, "double ")?;
            write!(o, "{}{}[] = {{ ", TEMPORARY_PREFIX, temp)?;
            write_zeros(o, x_coeffs.len())?;
            writeln!(o, " }};     // iir x-buffer [c={}]", channel)?;

            if !y_coeffs.is_empty() {
                let temp = self.next_temp();
                temps.y_buffer.push(temp);
                self.indent(o, "double ")?;
                write!(o, "{}{}[] = {{ ", TEMPORARY_PREFIX, temp)?;
                write_zeros(o, y_coeffs.len())?;
                writeln!(o, " }};     // iir y-buffer [c={}]", channel)?;
            }
        }

        temps.x_index = self.next_temp();
        self.indent(o, "int ")?;
        writeln!(o, "{}{} = 0;   // iir x-index", TEMPORARY_PREFIX, temps.x_index)?;
        if !y_coeffs.is_empty() {
            temps.y_index = self.next_temp();
            self.indent(o, "int ")?;
            writeln!(o, "{}{} = 0;   // iir y-index", TEMPORARY_PREFIX, temps.y_index)?;
        }

        self.iir_temps.insert(tag, temps);
        Ok(())
    }

    // ---- pre-channel-loop code --------------------------------------

    /// Emitted once per sample loop iteration, before the per-channel
    /// lines. Oscillator and filter state must advance exactly once per
    /// sample, no matter how many channel lines read it.
    pub(super) fn gen_pre_channel(&mut self, o: &mut dyn Write, e: &Expr) -> Result<()> {
        match &e.kind {
            ExprKind::Constant
            | ExprKind::Variable
            | ExprKind::Builtin
            | ExprKind::OldData
            | ExprKind::WaveField { .. } => Ok(()),
            ExprKind::Vector { components } => {
                let saved = self.channel_value;
                for (index, component) in components.iter().enumerate() {
                    self.channel_value = Some(index);
                    self.gen_pre_channel(o, component)?;
                }
                self.channel_value = saved;
                Ok(())
            }
            ExprKind::WaveSample { channel, index } => {
                let (i_saved, c_saved) = (self.i_allowed, self.c_allowed);
                self.i_allowed = true;
                self.c_allowed = true;
                self.gen_pre_channel(o, channel)?;
                self.gen_pre_channel(o, index)?;
                self.i_allowed = i_saved;
                self.c_allowed = c_saved;
                Ok(())
            }
            ExprKind::ArrayIndex { indices } => {
                for index in indices {
                    self.gen_pre_channel(o, index)?;
                }
                Ok(())
            }
            ExprKind::Binary { lhs, rhs, .. } => {
                self.gen_pre_channel(o, lhs)?;
                self.gen_pre_channel(o, rhs)
            }
            ExprKind::Unary { operand, .. } => self.gen_pre_channel(o, operand),
            ExprKind::Call { args, .. } => {
                for arg in args {
                    self.gen_pre_channel(o, arg)?;
                }
                Ok(())
            }
            ExprKind::Sinewave { tag, .. } => self.gen_sinewave_pre_channel(o, e, *tag),
            ExprKind::Sawtooth { tag, .. } => self.gen_sawtooth_pre_channel(o, e, *tag),
            ExprKind::Fft { input, .. } => self.gen_pre_channel(o, input),
            ExprKind::Iir {
                tag,
                x_coeffs,
                y_coeffs,
                input,
            } => self.gen_iir_pre_channel(o, *tag, x_coeffs.len(), y_coeffs.len(), input),
        }
    }

    fn gen_sinewave_pre_channel(&mut self, o: &mut dyn Write, e: &Expr, tag: u32) -> Result<()> {
        let channel_dependent = e.is_channel_dependent();
        let (start, limit) = self.osc_channel_range(channel_dependent, e)?;
        let tags = self.osc_tags(tag, e)?;

        for channel in start..limit {
            let name = format!("{}{}", TEMPORARY_PREFIX, tags[channel]);
            self.indent(o, &name)?;
            write!(o, "[2] = {}[3]*{}[1] - {}[0];   // sinewave update", name, name, name)?;
            if channel_dependent || self.inside_vector {
                write!(o, " [c={}]", channel)?;
            }
            writeln!(o)?;
            self.indent(o, &name)?;
            writeln!(o, "[0] = {}[1];", name)?;
            self.indent(o, &name)?;
            writeln!(o, "[1] = {}[2];", name)?;
        }
        Ok(())
    }

    fn gen_sawtooth_pre_channel(&mut self, o: &mut dyn Write, e: &Expr, tag: u32) -> Result<()> {
        let channel_dependent = e.is_channel_dependent();
        let (start, limit) = self.osc_channel_range(channel_dependent, e)?;
        let tags = self.osc_tags(tag, e)?;

        for channel in start..limit {
            let name = format!("{}{}", TEMPORARY_PREFIX, tags[channel]);
            self.indent(o, &name)?;
            write!(o, "[0] += {}[1];   // sawtooth update", name)?;
            if channel_dependent || self.inside_vector {
                write!(o, " [c={}]", channel)?;
            }
            writeln!(o)?;

            // Fold the ramp back at the rails and flip its direction.
            self.indent(o, "if ( ")?;
            writeln!(o, "{}[0] > 1.0 )", name)?;
            self.indent(o, "{\n")?;
            self.push_indent();
            self.indent(o, &name)?;
            writeln!(o, "[1] = -{}[1];", name)?;
            self.indent(o, &name)?;
            writeln!(o, "[0] = 2.0 - {}[0];", name)?;
            self.pop_indent();
            self.indent(o, "}\n")?;
            self.indent(o, "else if ( ")?;
            writeln!(o, "{}[0] < -1.0 )", name)?;
            self.indent(o, "{\n")?;
            self.push_indent();
            self.indent(o, &name)?;
            writeln!(o, "[1] = -{}[1];", name)?;
            self.indent(o, &name)?;
            writeln!(o, "[0] = -2.0 - {}[0];", name)?;
            self.pop_indent();
            self.indent(o, "}\n")?;
        }
        Ok(())
    }

    fn gen_iir_pre_channel(
        &mut self,
        o: &mut dyn Write,
        tag: u32,
        x_count: usize,
        y_count: usize,
        input: &Expr,
    ) -> Result<()> {
        self.gen_pre_channel(o, input)?;

        let temps = self.iir_temps.get(&tag).cloned().ok_or_else(|| {
            TranslationError::internal("iir temporaries missing in pre-channel phase", None)
        })?;
        let x_index = format!("{}{}", TEMPORARY_PREFIX, temps.x_index);
        let y_index = format!("{}{}", TEMPORARY_PREFIX, temps.y_index);
        let num_channels = self.program.num_channels as usize;

        // Rotate the circular delay-line indices.
        if x_count > 1 {
            if x_count == 2 {
                self.indent(o, &x_index)?;
                writeln!(o, " ^= 1;")?;
            } else {
                self.indent(o, "if ( --")?;
                writeln!(o, "{} < 0 )  {} = {};", x_index, x_index, x_count - 1)?;
            }
        }
        if y_count > 1 {
            if y_count == 2 {
                self.indent(o, &y_index)?;
                writeln!(o, " ^= 1;")?;
            } else {
                self.indent(o, "if ( --")?;
                writeln!(o, "{} < 0 )  {} = {};", y_index, y_index, y_count - 1)?;
            }
        }

        // Feed this sample's filter input into every channel's x-buffer.
        let (i_saved, c_saved) = (self.i_allowed, self.c_allowed);
        let channel_saved = self.channel_value;
        self.i_allowed = true;
        self.c_allowed = true;
        for channel in 0..num_channels {
            self.channel_value = Some(channel);
            self.indent(o, TEMPORARY_PREFIX)?;
            write!(o, "{}[{}] = ", temps.x_buffer[channel], x_index)?;
            self.gen_expr(o, input)?;
            writeln!(o, ";")?;
        }
        self.i_allowed = i_saved;
        self.c_allowed = c_saved;
        self.channel_value = channel_saved;

        let accum_tag = self.next_temp();
        if let Some(entry) = self.iir_temps.get_mut(&tag) {
            entry.accum = accum_tag;
        }
        let accum = format!("{}{}", TEMPORARY_PREFIX, accum_tag);
        self.indent(o, "double ")?;
        write!(o, "{}[] = {{ ", accum)?;
        write_zeros(o, num_channels)?;
        writeln!(o, " }};   // iir accumulator")?;

        let wrap = format!("{}{}", TEMPORARY_PREFIX, self.next_temp());
        if x_count > 1 || y_count > 1 {
            self.indent(o, "int ")?;
            writeln!(o, "{} = {};    // iir wraparound index", wrap, x_index)?;
        }
        let counter = format!("{}{}", TEMPORARY_PREFIX, self.next_temp());
        if x_count > 1 || y_count > 1 {
            self.indent(o, "int ")?;
            writeln!(o, "{};", counter)?;
        }

        // x dot product...
        if x_count == 1 {
            for channel in 0..num_channels {
                self.indent(o, &accum)?;
                write!(
                    o,
                    "[{}] += {}{}[0] * {}{}[0];",
                    channel, TEMPORARY_PREFIX, temps.x_buffer[channel], TEMPORARY_PREFIX, temps.x_coeff
                )?;
                if channel == 0 {
                    write!(o, "    // iir x dot product")?;
                }
                writeln!(o)?;
            }
        } else {
            self.indent(o, "for ( ")?;
            writeln!(
                o,
                "{}=0; {}<{}; ++{} )    // iir x dot product",
                counter, counter, x_count, counter
            )?;
            self.indent(o, "{\n")?;
            self.push_indent();
            for channel in 0..num_channels {
                self.indent(o, &accum)?;
                writeln!(
                    o,
                    "[{}] += {}{}[{}] * {}{}[{}];",
                    channel,
                    TEMPORARY_PREFIX,
                    temps.x_buffer[channel],
                    wrap,
                    TEMPORARY_PREFIX,
                    temps.x_coeff,
                    counter
                )?;
            }
            if x_count == 2 {
                self.indent(o, &wrap)?;
                writeln!(o, " ^= 1;")?;
            } else {
                self.indent(o, "if ( ++")?;
                writeln!(o, "{} == {} )  {} = 0;", wrap, x_count, wrap)?;
            }
            self.pop_indent();
            self.indent(o, "}\n")?;
        }

        // y dot product feeds back the accumulated output...
        if y_count > 0 {
            if y_count == 1 {
                for channel in 0..num_channels {
                    self.indent(o, &accum)?;
                    write!(
                        o,
                        "[{}] += {}{}[0] * {}{}[0];",
                        channel,
                        TEMPORARY_PREFIX,
                        temps.y_buffer[channel],
                        TEMPORARY_PREFIX,
                        temps.y_coeff
                    )?;
                    if channel == 0 {
                        write!(o, "    // iir y dot product")?;
                    }
                    writeln!(o)?;
                }
            } else {
                self.indent(o, "for ( ")?;
                writeln!(
                    o,
                    "{}={}, {}=0; {} < {}; ++{} )    // iir y dot product",
                    wrap, y_index, counter, counter, y_count, counter
                )?;
                self.indent(o, "{\n")?;
                self.push_indent();
                if y_count == 2 {
                    self.indent(o, &wrap)?;
                    writeln!(o, " ^= 1;")?;
                } else {
                    self.indent(o, "if ( ++")?;
                    writeln!(o, "{} == {} )  {} = 0;", wrap, y_count, wrap)?;
                }
                for channel in 0..num_channels {
                    self.indent(o, &accum)?;
                    writeln!(
                        o,
                        "[{}] += {}{}[{}] * {}{}[{}];",
                        channel,
                        TEMPORARY_PREFIX,
                        temps.y_buffer[channel],
                        wrap,
                        TEMPORARY_PREFIX,
                        temps.y_coeff,
                        counter
                    )?;
                }
                self.pop_indent();
                self.indent(o, "}\n")?;
            }

            for channel in 0..num_channels {
                self.indent(o, TEMPORARY_PREFIX)?;
                writeln!(
                    o,
                    "{}[{}] = {}[{}];",
                    temps.y_buffer[channel], y_index, accum, channel
                )?;
            }
        }
        Ok(())
    }

    // ---- shared helpers ---------------------------------------------

    /// The channels an oscillator needs state for: the enclosing vector
    /// component, every channel when channel-dependent, or a single
    /// shared slot.
    fn osc_channel_range(&self, channel_dependent: bool, e: &Expr) -> Result<(usize, usize)> {
        if self.inside_vector {
            let start = self.require_channel(e)?;
            Ok((start, start + 1))
        } else if channel_dependent {
            Ok((0, self.program.num_channels as usize))
        } else {
            Ok((0, 1))
        }
    }

    fn osc_tags(&self, tag: u32, e: &Expr) -> Result<Vec<u32>> {
        self.osc_temps.get(&tag).cloned().ok_or_else(|| {
            TranslationError::internal(
                "oscillator temporary was not initialized before use",
                Some(&e.first),
            )
        })
    }

    fn osc_temp(&self, tag: u32, channel: usize, e: &Expr) -> Result<u32> {
        let tags = self.osc_tags(tag, e)?;
        tags.get(channel).copied().ok_or_else(|| {
            TranslationError::internal(
                "oscillator channel index out of range",
                Some(&e.first),
            )
        })
    }

    fn require_channel(&self, e: &Expr) -> Result<usize> {
        self.channel_value.ok_or_else(|| {
            TranslationError::internal(
                "channel-dependent code emitted outside a channel context",
                Some(&e.first),
            )
        })
    }
}

fn write_zeros(o: &mut dyn Write, count: usize) -> Result<()> {
    for index in 0..count {
        if index > 0 {
            write!(o, ", ")?;
        }
        write!(o, "0")?;
    }
    Ok(())
}
