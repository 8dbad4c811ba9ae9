#![cfg(test)]


mod cycle {
    mod integration;
}
mod discovery {
    mod integration;
}
mod probe {
    mod integration;
}
