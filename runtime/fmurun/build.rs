// Copyright 2021 Siemens AG
// SPDX-License-Identifier: MIT

fn main() {
    // variadic logger callback handed to FMUs; formats the message and
    // forwards it to `fmurun_log_message`
    cc::Build::new()
        .file("src/logger.c")
        .compile("fmurun_logger");

    println!("cargo:rerun-if-changed=src/logger.c");
}
