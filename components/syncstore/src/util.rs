/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

/// For use with `#[serde(skip_serializing_if = )]`
#[inline]
pub fn is_default<T: PartialEq + Default>(v: &T) -> bool {
    *v == T::default()
}

/// Return with the provided Err(error) after invoking Into conversions
#[macro_export]
macro_rules! throw {
    ($e:expr) => {{
        log::error!("Error: {}", $e);
        return Err(::std::convert::Into::into($e));
    }};
}

/// Like assert! but with `throw!` and not `panic!`.
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $e:expr) => {
        if !($cond) {
            log::warn!(concat!("Ensure ", stringify!($cond), " failed!"));
            throw!($e)
        }
    };
}
