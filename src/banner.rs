//! Startup banner.

const COLORS: [&str; 6] = [
    "\x1b[31m", // red
    "\x1b[33m", // yellow
    "\x1b[32m", // green
    "\x1b[36m", // cyan
    "\x1b[34m", // blue
    "\x1b[35m", // magenta
];
const RESET: &str = "\x1b[0m";

const ART: [&str; 7] = [
    "",
    r"   ______                        __      ",
    r"  / __/ /___ _      ______ _____ _/ /____ ",
    r" / /_/ / __ \ | /| / / __ `/ __ `/ __/ _ \",
    r"/ __/ / /_/ / |/ |/ / /_/ / /_/ / /_/  __/",
    r"/_/ /_/\____/|__/|__/\__, /\__,_/\__/\___/ ",
    r"                    /____/                 ",
];

/// Print the colored startup banner to stdout.
pub fn print() {
    for line in ART {
        for (index, ch) in line.chars().enumerate() {
            print!("{}{}", COLORS[index % COLORS.len()], ch);
        }
        println!("{RESET}");
    }
}
