//! Host callable signatures
//!
//! [`HostFunction`] and [`HostMethod`] are implemented for closures and function
//! pointers of up to ten arguments whose argument types implement
//! [`FromScript`]. They expose the parameter tags used for the VM's argument check
//! and read the arguments from the stack in left-to-right order.

use crate::context::VmContext;
use crate::convert::FromScript;
use crate::error::Result;
use crate::tags::param_tag;

/// A host callable without a receiver
pub trait HostFunction<Args>: 'static {
    type Output;

    /// Number of script-visible parameters
    fn arity() -> usize;

    /// One tag per parameter
    fn param_tags() -> String;

    /// Reads the arguments starting at stack index `first` and calls the function
    fn call_with(&self, ctx: &VmContext, first: isize) -> Result<Self::Output>;
}

/// A host callable taking `&mut T` as its receiver
pub trait HostMethod<T, Args>: 'static {
    type Output;

    /// Number of script-visible parameters, the receiver excluded
    fn arity() -> usize;

    /// One tag per parameter, the receiver excluded
    fn param_tags() -> String;

    /// Reads the arguments starting at stack index `first` and calls the method
    fn call_with(&self, ctx: &VmContext, receiver: &mut T, first: isize) -> Result<Self::Output>;
}

macro_rules! impl_host_callables {
    ($($arg:ident),*) => {
        impl<F, R, $($arg,)*> HostFunction<($($arg,)*)> for F
        where
            F: Fn($($arg),*) -> R + 'static,
            $($arg: FromScript + 'static,)*
        {
            type Output = R;

            fn arity() -> usize {
                let names: &[&str] = &[$(stringify!($arg)),*];
                names.len()
            }

            fn param_tags() -> String {
                #[allow(unused_mut)]
                let mut tags = String::new();
                $(tags.push(param_tag::<$arg>());)*
                tags
            }

            #[allow(non_snake_case, unused_variables, unused_mut, unused_assignments)]
            fn call_with(&self, ctx: &VmContext, first: isize) -> Result<R> {
                let mut idx = first;
                $(
                    let $arg = <$arg as FromScript>::from_stack(ctx, idx)?;
                    idx += 1;
                )*
                Ok(self($($arg),*))
            }
        }

        impl<F, T, R, $($arg,)*> HostMethod<T, ($($arg,)*)> for F
        where
            F: Fn(&mut T, $($arg),*) -> R + 'static,
            $($arg: FromScript + 'static,)*
        {
            type Output = R;

            fn arity() -> usize {
                let names: &[&str] = &[$(stringify!($arg)),*];
                names.len()
            }

            fn param_tags() -> String {
                #[allow(unused_mut)]
                let mut tags = String::new();
                $(tags.push(param_tag::<$arg>());)*
                tags
            }

            #[allow(non_snake_case, unused_variables, unused_mut, unused_assignments)]
            fn call_with(&self, ctx: &VmContext, receiver: &mut T, first: isize) -> Result<R> {
                let mut idx = first;
                $(
                    let $arg = <$arg as FromScript>::from_stack(ctx, idx)?;
                    idx += 1;
                )*
                Ok(self(receiver, $($arg),*))
            }
        }
    };
}

impl_host_callables!();
impl_host_callables!(A1);
impl_host_callables!(A1, A2);
impl_host_callables!(A1, A2, A3);
impl_host_callables!(A1, A2, A3, A4);
impl_host_callables!(A1, A2, A3, A4, A5);
impl_host_callables!(A1, A2, A3, A4, A5, A6);
impl_host_callables!(A1, A2, A3, A4, A5, A6, A7);
impl_host_callables!(A1, A2, A3, A4, A5, A6, A7, A8);
impl_host_callables!(A1, A2, A3, A4, A5, A6, A7, A8, A9);
impl_host_callables!(A1, A2, A3, A4, A5, A6, A7, A8, A9, A10);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Table;

    fn tags_of<Args, F: HostFunction<Args>>(_: &F) -> (usize, String) {
        (F::arity(), F::param_tags())
    }

    fn method_tags_of<T, Args, F: HostMethod<T, Args>>(_: &F) -> (usize, String) {
        (F::arity(), F::param_tags())
    }

    struct Counter;

    #[test]
    fn test_function_tags_follow_parameter_order() {
        let f = |_a: i32, _b: String, _c: f64, _d: bool| {};
        assert_eq!(tags_of(&f), (4, "isf.".to_string()));
        let g = |_t: Table| 0;
        assert_eq!(tags_of(&g), (1, "t".to_string()));
        let h = || 1;
        assert_eq!(tags_of(&h), (0, String::new()));
    }

    #[test]
    fn test_method_tags_exclude_receiver() {
        let m = |_c: &mut Counter, _by: i64| {};
        assert_eq!(method_tags_of(&m), (1, "i".to_string()));
    }
}
