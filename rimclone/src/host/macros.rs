// SPDX-License-Identifier: MIT

#[macro_export]
macro_rules! args {
    ( $( $x:expr ),* ) => {
        vec![ $( $x.to_string() ),* ]
    };
}
