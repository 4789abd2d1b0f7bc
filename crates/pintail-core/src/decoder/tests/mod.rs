mod basic;
mod testutil;
