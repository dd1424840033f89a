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

//! The fixed table of intrinsic mathematical functions.
//!
//! Intrinsics are resolved at parse time; every intrinsic takes real
//! arguments and produces a real result. The target names are either C
//! standard library functions or helpers supplied by the runtime.

pub struct Intrinsic {
    /// Name in Sonic.
    pub name: &'static str,
    /// Name in the generated C++.
    pub target_name: &'static str,
    pub num_params: usize,
}

pub const INTRINSICS: &[Intrinsic] = &[
    // trig-related...
    Intrinsic { name: "sin", target_name: "sin", num_params: 1 },
    Intrinsic { name: "sinh", target_name: "sinh", num_params: 1 },
    Intrinsic { name: "cos", target_name: "cos", num_params: 1 },
    Intrinsic { name: "cosh", target_name: "cosh", num_params: 1 },
    Intrinsic { name: "tan", target_name: "tan", num_params: 1 },
    Intrinsic { name: "tanh", target_name: "tanh", num_params: 1 },
    Intrinsic { name: "acos", target_name: "acos", num_params: 1 },
    Intrinsic { name: "asin", target_name: "asin", num_params: 1 },
    Intrinsic { name: "atan", target_name: "atan", num_params: 1 },
    Intrinsic { name: "atan2", target_name: "atan2", num_params: 2 },
    // misc...
    Intrinsic { name: "abs", target_name: "fabs", num_params: 1 },
    Intrinsic { name: "ceil", target_name: "ceil", num_params: 1 },
    Intrinsic { name: "floor", target_name: "floor", num_params: 1 },
    Intrinsic { name: "sqrt", target_name: "sqrt", num_params: 1 },
    Intrinsic { name: "hypot", target_name: "hypot", num_params: 2 },
    Intrinsic { name: "square", target_name: "Sonic_Square", num_params: 1 },
    Intrinsic { name: "cube", target_name: "Sonic_Cube", num_params: 1 },
    Intrinsic { name: "quart", target_name: "Sonic_Quart", num_params: 1 },
    Intrinsic { name: "recip", target_name: "Sonic_Recip", num_params: 1 },
    Intrinsic { name: "noise", target_name: "Sonic_Noise", num_params: 1 },
    // logarithmic/exponential...
    Intrinsic { name: "ln", target_name: "log", num_params: 1 },
    Intrinsic { name: "log", target_name: "log10", num_params: 1 },
    Intrinsic { name: "exp", target_name: "exp", num_params: 1 },
    Intrinsic { name: "dB", target_name: "Sonic_dB", num_params: 1 },
];

pub fn find_intrinsic(name: &str) -> Option<&'static Intrinsic> {
    INTRINSICS.iter().find(|entry| entry.name == name)
}

/// The four constructs that look like calls but compile to stateful
/// per-loop code instead.
pub fn is_pseudo_function(name: &str) -> bool {
    matches!(name, "sinewave" | "sawtooth" | "fft" | "iir")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_maps_to_target_names() {
        assert_eq!(find_intrinsic("abs").unwrap().target_name, "fabs");
        assert_eq!(find_intrinsic("ln").unwrap().target_name, "log");
        assert_eq!(find_intrinsic("log").unwrap().target_name, "log10");
        assert_eq!(find_intrinsic("atan2").unwrap().num_params, 2);
        assert!(find_intrinsic("sinewave").is_none());
    }

    #[test]
    fn pseudo_functions_are_not_intrinsics() {
        for name in &["sinewave", "sawtooth", "fft", "iir"] {
            assert!(is_pseudo_function(name));
            assert!(find_intrinsic(name).is_none());
        }
        assert!(!is_pseudo_function("sin"));
    }
}
